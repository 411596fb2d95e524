//! The task catalog registered on every run.

use std::rc::Rc;

use crate::config::Config;
use crate::migrate::{
    DonorBackfillTask, LegacyMetaRecoverTask, PaymentMetaSplitTask, PostmetaRecoverTask,
    donor_backfill, payment_meta, postmeta_recover, recover_meta,
};
use crate::payment::PaymentApi;
use crate::reconcile::{self, DuplicateSourcesTask};
use crate::upgrade::UpgradeTask;
use crate::upgrade::registry::Registry;

/// Build the registry. Data migrations run before the processor cleanup so
/// donor links exist by the time sources are reconciled.
///
/// `api` is `None` when no secret key is configured; the cleanup task then
/// fails with a configuration error when it is reached.
pub fn default_registry(config: &Config, api: Option<Rc<dyn PaymentApi>>) -> Registry {
    let batch = &config.batch;
    let mut registry = Registry::new();

    registry.register(
        UpgradeTask::new(
            payment_meta::TASK_ID,
            payment_meta::TASK_VERSION,
            batch.donation_page_size,
            PaymentMetaSplitTask,
        )
        .with_description("Split the legacy payment meta blob into individual donation meta keys"),
    );
    registry.register(
        UpgradeTask::new(
            donor_backfill::TASK_ID,
            donor_backfill::TASK_VERSION,
            batch.donation_page_size,
            DonorBackfillTask,
        )
        .with_description("Link donations without a donor id to the donor with the same email"),
    );
    registry.register(
        UpgradeTask::new(
            postmeta_recover::TASK_ID,
            postmeta_recover::TASK_VERSION,
            batch.donation_page_size,
            PostmetaRecoverTask,
        )
        .with_description("Copy missing donation meta from the payment post meta rows"),
    );
    registry.register(
        UpgradeTask::new(
            recover_meta::TASK_ID,
            recover_meta::TASK_VERSION,
            batch.legacy_meta_page_size,
            LegacyMetaRecoverTask,
        )
        .with_description("Restore donation meta from the legacy payment meta table")
        .completes_with(recover_meta::SUPERSEDED_TASK_ID),
    );
    registry.register(
        UpgradeTask::new(
            reconcile::TASK_ID,
            reconcile::TASK_VERSION,
            batch.donor_page_size,
            DuplicateSourcesTask::new(api),
        )
        .with_description("Detach duplicate card sources from processor customers"),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_and_page_sizes() {
        let mut config = Config::default();
        config.batch.donor_page_size = 7;
        let registry = default_registry(&config, None);

        let ids: Vec<&str> = registry.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                payment_meta::TASK_ID,
                donor_backfill::TASK_ID,
                postmeta_recover::TASK_ID,
                recover_meta::TASK_ID,
                reconcile::TASK_ID,
            ]
        );
        assert_eq!(registry.get(reconcile::TASK_ID).unwrap().page_size, 7);
        assert_eq!(
            registry.get(postmeta_recover::TASK_ID).unwrap().page_size,
            config.batch.donation_page_size
        );
        assert_eq!(
            registry.get(recover_meta::TASK_ID).unwrap().completes_with,
            vec![recover_meta::SUPERSEDED_TASK_ID.to_string()]
        );
    }
}
