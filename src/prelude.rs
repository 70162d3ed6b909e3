// `debug!`, `info!`, `warn!` and `error!` for crate modules, backed by
// `log` or `tracing` depending on features.

#[allow(unused_imports)]
pub(crate) use crate::observability::{
    log_debug as debug, log_error as error, log_info as info, log_warn as warn,
};
