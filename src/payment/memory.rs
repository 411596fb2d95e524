//! In-process processor double with call recording and failure injection.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

use crate::model::{Customer, PaymentSource};
use crate::payment::{ApiError, ApiResult, PaymentApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListSources,
    RetrieveSource,
    DetachSource,
    SetDefaultSource,
    GetCustomer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Operation,
    pub customer_id: String,
    pub source_id: Option<String>,
}

#[derive(Debug, Default)]
struct CustomerState {
    default_source_id: Option<String>,
    sources: Vec<PaymentSource>,
}

#[derive(Debug, Default)]
struct State {
    customers: BTreeMap<String, CustomerState>,
    /// (operation, customer or source id) pairs that fail.
    failures: HashSet<(Operation, String)>,
    hidden_fingerprints: HashSet<String>,
    calls: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct InMemoryPaymentApi {
    state: RefCell<State>,
}

impl InMemoryPaymentApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer_id: &str, sources: Vec<PaymentSource>) {
        let default_source_id = sources.first().map(|s| s.id.clone());
        self.state.borrow_mut().customers.insert(
            customer_id.to_string(),
            CustomerState {
                default_source_id,
                sources,
            },
        );
    }

    pub fn set_default(&self, customer_id: &str, source_id: Option<&str>) {
        if let Some(customer) = self.state.borrow_mut().customers.get_mut(customer_id) {
            customer.default_source_id = source_id.map(str::to_string);
        }
    }

    /// Make `op` fail for the given customer id (list, get) or source id
    /// (retrieve, detach, set default).
    pub fn fail(&self, op: Operation, subject: &str) {
        self.state
            .borrow_mut()
            .failures
            .insert((op, subject.to_string()));
    }

    /// List results omit this source's fingerprint; retrieve still has it.
    pub fn hide_listed_fingerprint(&self, source_id: &str) {
        self.state
            .borrow_mut()
            .hidden_fingerprints
            .insert(source_id.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    pub fn source_ids(&self, customer_id: &str) -> Vec<String> {
        self.state
            .borrow()
            .customers
            .get(customer_id)
            .map(|c| c.sources.iter().map(|s| s.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn default_source(&self, customer_id: &str) -> Option<String> {
        self.state
            .borrow()
            .customers
            .get(customer_id)
            .and_then(|c| c.default_source_id.clone())
    }

    fn begin(&self, op: Operation, customer_id: &str, source_id: Option<&str>) -> ApiResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call {
            op,
            customer_id: customer_id.to_string(),
            source_id: source_id.map(str::to_string),
        });
        let subject = source_id.unwrap_or(customer_id);
        if state.failures.contains(&(op, subject.to_string())) {
            return Err(ApiError::Server {
                status: 500,
                message: format!("injected failure for {subject}"),
            });
        }
        if !state.customers.contains_key(customer_id) {
            return Err(ApiError::NotFound(format!("No such customer: '{customer_id}'")));
        }
        Ok(())
    }
}

impl PaymentApi for InMemoryPaymentApi {
    fn list_sources(
        &self,
        customer_id: &str,
        limit: u32,
        _source_type: &str,
    ) -> ApiResult<Vec<PaymentSource>> {
        self.begin(Operation::ListSources, customer_id, None)?;
        let state = self.state.borrow();
        let customer = &state.customers[customer_id];
        Ok(customer
            .sources
            .iter()
            .take(limit as usize)
            .map(|s| {
                let mut listed = s.clone();
                listed.is_default = customer.default_source_id.as_deref() == Some(s.id.as_str());
                if state.hidden_fingerprints.contains(&s.id) {
                    listed.fingerprint.clear();
                }
                listed
            })
            .collect())
    }

    fn retrieve_source(&self, customer_id: &str, source_id: &str) -> ApiResult<PaymentSource> {
        self.begin(Operation::RetrieveSource, customer_id, Some(source_id))?;
        let state = self.state.borrow();
        state.customers[customer_id]
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("No such source: '{source_id}'")))
    }

    fn detach_source(&self, customer_id: &str, source_id: &str) -> ApiResult<()> {
        self.begin(Operation::DetachSource, customer_id, Some(source_id))?;
        let mut state = self.state.borrow_mut();
        let customer = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| ApiError::NotFound(customer_id.to_string()))?;
        let before = customer.sources.len();
        customer.sources.retain(|s| s.id != source_id);
        if customer.sources.len() == before {
            return Err(ApiError::NotFound(format!("No such source: '{source_id}'")));
        }
        if customer.default_source_id.as_deref() == Some(source_id) {
            customer.default_source_id = customer.sources.first().map(|s| s.id.clone());
        }
        Ok(())
    }

    fn set_default_source(&self, customer_id: &str, source_id: &str) -> ApiResult<()> {
        self.begin(Operation::SetDefaultSource, customer_id, Some(source_id))?;
        let mut state = self.state.borrow_mut();
        let customer = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| ApiError::NotFound(customer_id.to_string()))?;
        if !customer.sources.iter().any(|s| s.id == source_id) {
            return Err(ApiError::InvalidRequest(format!(
                "source '{source_id}' is not attached to '{customer_id}'"
            )));
        }
        customer.default_source_id = Some(source_id.to_string());
        Ok(())
    }

    fn get_customer(&self, customer_id: &str) -> ApiResult<Customer> {
        self.begin(Operation::GetCustomer, customer_id, None)?;
        let state = self.state.borrow();
        Ok(Customer {
            id: customer_id.to_string(),
            default_source_id: state.customers[customer_id].default_source_id.clone(),
        })
    }
}
