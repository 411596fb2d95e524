pub mod events;
pub mod import;
pub mod init;
pub mod lifecycle;
pub mod list;
pub mod run;
pub mod status;

use std::rc::Rc;

use crate::config::Config;
use crate::error::Result;
use crate::payment::PaymentApi;
use crate::payment::stripe::StripeClient;
use crate::tasks;
use crate::upgrade::registry::Registry;

/// Registry for a CLI invocation. A processor client is only built when a
/// secret key is configured.
pub(crate) fn registry(config: &Config) -> Result<Registry> {
    let api: Option<Rc<dyn PaymentApi>> = match config.stripe.secret_key {
        Some(_) => Some(Rc::new(StripeClient::new(&config.stripe)?)),
        None => {
            tracing::debug!("no processor secret key configured");
            None
        }
    };
    Ok(tasks::default_registry(config, api))
}
