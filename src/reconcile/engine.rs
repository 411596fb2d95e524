use crate::error::Result;
use crate::model::{CUSTOMER_ID_META_KEY, Donor, PaymentSource};
use crate::observe::{EventCategory, ObservabilitySink};
use crate::payment::{MAX_SOURCES_PER_CUSTOMER, PaymentApi, SOURCE_TYPE};
use crate::reconcile::{ReconciliationResult, is_card_style, partition_sources};
use crate::store::StoreAdapter;

/// Per-donor duplicate-source cleanup.
///
/// Processor failures are recorded on the result and reported to the sink;
/// they never abort the donor, the page or the task. Only store failures
/// propagate.
pub struct ReconciliationEngine<'a> {
    api: &'a dyn PaymentApi,
    store: &'a dyn StoreAdapter,
    sink: &'a dyn ObservabilitySink,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        api: &'a dyn PaymentApi,
        store: &'a dyn StoreAdapter,
        sink: &'a dyn ObservabilitySink,
    ) -> Self {
        Self { api, store, sink }
    }

    /// Reconcile each donor in order.
    pub fn reconcile_page(&self, donors: &[Donor]) -> Result<Vec<ReconciliationResult>> {
        donors.iter().map(|d| self.reconcile_donor(d)).collect()
    }

    pub fn reconcile_donor(&self, donor: &Donor) -> Result<ReconciliationResult> {
        let Some(customer_id) = self.resolve_customer_id(donor)? else {
            tracing::debug!(donor_id = donor.id, "no processor customer; skipping");
            return Ok(ReconciliationResult::for_donor(donor.id, None));
        };
        Ok(self.reconcile_customer(donor.id, &customer_id))
    }

    /// The donor's own customer id, else the one stored on its latest donation.
    ///
    /// "Latest" is the last id in `payment_ids` as stored, which assumes the
    /// list is already chronological.
    pub fn resolve_customer_id(&self, donor: &Donor) -> Result<Option<String>> {
        if let Some(id) = non_blank(donor.external_customer_id.as_deref()) {
            return Ok(Some(id));
        }
        let Some(payment_id) = donor.latest_payment_id() else {
            return Ok(None);
        };
        let stored = self
            .store
            .get_donation_meta(payment_id, CUSTOMER_ID_META_KEY)?;
        Ok(non_blank(stored.as_deref()))
    }

    pub fn reconcile_customer(&self, donor_id: u64, customer_id: &str) -> ReconciliationResult {
        let mut result = ReconciliationResult::for_donor(donor_id, Some(customer_id.to_string()));

        let listed = match self
            .api
            .list_sources(customer_id, MAX_SOURCES_PER_CUSTOMER, SOURCE_TYPE)
        {
            Ok(sources) => sources,
            Err(err) => {
                let message = format!("failed to list sources: {err}");
                self.sink.record(
                    EventCategory::SourceLookup,
                    &format!("donor {donor_id} customer {customer_id}: {message}"),
                );
                result.push_error(customer_id, message);
                return result;
            }
        };

        let sources = self.fill_fingerprints(customer_id, listed, &mut result);
        let (unique, duplicates) = partition_sources(sources);
        result.unique_sources = unique;
        result.duplicate_source_ids = duplicates;

        self.ensure_default(customer_id, &mut result);
        self.detach_duplicates(customer_id, &mut result);

        self.sink.record(
            EventCategory::Reconciliation,
            &format!(
                "donor {donor_id} customer {customer_id}: {} unique, {} duplicate(s), {} detached, {} error(s)",
                result.unique_sources.len(),
                result.duplicate_source_ids.len(),
                result.detached_source_ids.len(),
                result.errors.len()
            ),
        );
        result
    }

    /// Card-style sources listed without a fingerprint are fetched individually.
    fn fill_fingerprints(
        &self,
        customer_id: &str,
        sources: Vec<PaymentSource>,
        result: &mut ReconciliationResult,
    ) -> Vec<PaymentSource> {
        sources
            .into_iter()
            .map(|mut source| {
                if !is_card_style(&source.id) || !source.fingerprint.is_empty() {
                    return source;
                }
                match self.api.retrieve_source(customer_id, &source.id) {
                    Ok(full) => source.fingerprint = full.fingerprint,
                    Err(err) => {
                        let message = format!("failed to retrieve source: {err}");
                        self.sink.record(
                            EventCategory::SourceLookup,
                            &format!("customer {customer_id} source {}: {message}", source.id),
                        );
                        result.push_error(&source.id, message);
                    }
                }
                source
            })
            .collect()
    }

    fn ensure_default(&self, customer_id: &str, result: &mut ReconciliationResult) {
        let Some(canonical) = result.unique_sources.first().map(|s| s.id.clone()) else {
            return;
        };

        let current = match self.api.get_customer(customer_id) {
            Ok(customer) => customer.default_source_id,
            Err(err) => {
                let message = format!("failed to load customer: {err}");
                self.sink.record(
                    EventCategory::DefaultSource,
                    &format!("customer {customer_id}: {message}"),
                );
                result.push_error(customer_id, message);
                return;
            }
        };

        if current.as_deref() == Some(canonical.as_str()) {
            mark_default(result, &canonical);
            return;
        }

        match self.api.set_default_source(customer_id, &canonical) {
            Ok(()) => {
                result.default_source_changed = true;
                mark_default(result, &canonical);
                self.sink.record(
                    EventCategory::DefaultSource,
                    &format!(
                        "customer {customer_id}: default source {} -> {canonical}",
                        current.as_deref().unwrap_or("none")
                    ),
                );
            }
            Err(err) => {
                let message = format!("failed to set default source: {err}");
                self.sink.record(
                    EventCategory::DefaultSource,
                    &format!("customer {customer_id} source {canonical}: {message}"),
                );
                result.push_error(&canonical, message);
            }
        }
    }

    fn detach_duplicates(&self, customer_id: &str, result: &mut ReconciliationResult) {
        for source_id in result.duplicate_source_ids.clone() {
            match self.api.detach_source(customer_id, &source_id) {
                Ok(()) => {
                    self.sink.record(
                        EventCategory::Detach,
                        &format!("customer {customer_id}: detached duplicate source {source_id}"),
                    );
                    result.detached_source_ids.push(source_id);
                }
                Err(err) if err.is_not_found() => {
                    tracing::debug!(customer_id, source_id = %source_id, "source already detached");
                    result.detached_source_ids.push(source_id);
                }
                Err(err) => {
                    let message = format!("failed to detach source: {err}");
                    self.sink.record(
                        EventCategory::Detach,
                        &format!("customer {customer_id} source {source_id}: {message}"),
                    );
                    result.push_error(&source_id, message);
                }
            }
        }
    }
}

fn mark_default(result: &mut ReconciliationResult, source_id: &str) {
    for source in &mut result.unique_sources {
        source.is_default = source.id == source_id;
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
