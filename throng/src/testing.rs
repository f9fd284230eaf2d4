//! In-memory backend used by the workflow and pool tests.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    session::Step,
    transport::{Exchange, Reply, Transport, TransportError},
};

/// Misbehaviour injected for one user.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    LoginStatus(u16),
    LoginRejected,
    NoTask,
    EmptyBatchList,
    SubmitStatus { item: usize },
    SubmitRejected { item: usize },
    ConfirmStatus { item: usize },
    Network(Step),
    Panic(Step),
}

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Call {
    pub user: String,
    pub step: Step,
    pub item: Option<String>,
    pub body: Option<Value>,
}

impl Call {
    pub fn describe(&self) -> String {
        match &self.item {
            Some(item) if matches!(self.step, Step::Submit | Step::Confirm) => {
                format!("{} {item}", self.step)
            }
            _ => self.step.to_string(),
        }
    }
}

pub struct FakeBackend {
    items: usize,
    extra_batches: usize,
    empty_group_on: Option<usize>,
    malformed_from: Option<usize>,
    latency: Duration,
    faults: HashMap<String, Fault>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    /// Every user gets one batch with `items` single-option work items.
    pub fn new(items: usize) -> Self {
        Self {
            items,
            extra_batches: 0,
            empty_group_on: None,
            malformed_from: None,
            latency: Duration::ZERO,
            faults: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fault(mut self, user: &str, fault: Fault) -> Self {
        self.faults.insert(user.to_string(), fault);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_extra_batches(mut self, n: usize) -> Self {
        self.extra_batches = n;
        self
    }

    pub fn with_empty_group_on_item(mut self, item: usize) -> Self {
        self.empty_group_on = Some(item);
        self
    }

    /// Batches after the first lack `createBy` and carry non-numeric scoring.
    pub fn with_malformed_later_batches(mut self) -> Self {
        self.malformed_from = Some(2);
        self
    }

    pub fn with_malformed_first_batch(mut self) -> Self {
        self.malformed_from = Some(1);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_for(&self, user: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.user == user).collect()
    }

    pub fn bodies_for(&self, user: &str, step: Step) -> Vec<Value> {
        self.calls_for(user)
            .into_iter()
            .filter(|c| c.step == step)
            .filter_map(|c| c.body)
            .collect()
    }

    fn batch(&self, n: usize) -> Value {
        if self.malformed_from.is_some_and(|from| n >= from) {
            return json!({
                "evaluation": { "id": format!("batch-{n}") },
                "scaleList": [{
                    "id": "broken",
                    "optionVo": [{ "questionOptionScoreList": [
                        { "contentOptions": "?", "scoring": "high" }
                    ]}]
                }]
            });
        }
        let items: Vec<Value> = (0..self.items)
            .map(|i| {
                let options = if self.empty_group_on == Some(i) {
                    json!([])
                } else {
                    json!([{ "contentOptions": "only", "scoring": 1 }])
                };
                json!({
                    "id": format!("item-{i}"),
                    "scaleName": format!("Item {i}"),
                    "optionVo": [{ "questionOptionScoreList": options }]
                })
            })
            .collect();
        json!({
            "evaluation": { "id": format!("batch-{n}"), "createBy": "admin", "taskName": "load" },
            "scaleList": items
        })
    }

    fn login(&self, user: &str, fault: Option<&Fault>) -> Reply {
        match fault {
            Some(Fault::LoginStatus(status)) => Reply::empty(*status),
            Some(Fault::LoginRejected) => Reply::new(
                200,
                json!({ "success": false, "message": "bad credentials" }),
            ),
            _ => Reply::new(
                200,
                json!({
                    "success": true,
                    "result": {
                        "token": format!("tok-{user}"),
                        "studentInfo": { "id": format!("uid-{user}"), "userName": user }
                    }
                }),
            ),
        }
    }

    fn discover(&self, user: &str, path: &str, fault: Option<&Fault>) -> Reply {
        if !path.ends_with(&format!("/uid-{user}")) {
            return Reply::empty(404);
        }
        let batches: Vec<Value> = (1..=1 + self.extra_batches).map(|n| self.batch(n)).collect();
        match fault {
            Some(Fault::NoTask) => Reply::new(
                200,
                json!({ "success": true, "isHaveTask": false, "result": [] }),
            ),
            Some(Fault::EmptyBatchList) => Reply::new(
                200,
                json!({ "success": true, "isHaveTask": true, "result": [] }),
            ),
            _ => Reply::new(
                200,
                json!({ "success": true, "isHaveTask": true, "result": batches }),
            ),
        }
    }
}

fn item_index(item: Option<&str>) -> Option<usize> {
    item?.strip_prefix("item-")?.parse().ok()
}

#[async_trait]
impl Transport for FakeBackend {
    async fn request(&self, exchange: Exchange) -> Result<Reply, TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let step = match exchange.label {
            "login" => Step::Authenticate,
            "discover" => Step::Discover,
            "submit" => Step::Submit,
            "confirm" => Step::Confirm,
            _ => return Ok(Reply::empty(404)),
        };
        let user = match step {
            Step::Authenticate => exchange
                .body
                .as_ref()
                .and_then(|b| b.get("account"))
                .and_then(Value::as_str),
            _ => exchange
                .bearer_token()
                .and_then(|t| t.strip_prefix("tok-")),
        }
        .unwrap_or_default()
        .to_string();
        let item = exchange
            .body
            .as_ref()
            .and_then(|b| b.get("scaleId"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Call {
                user: user.clone(),
                step,
                item: item.clone(),
                body: exchange.body.clone(),
            });

        let fault = self.faults.get(&user);
        match fault {
            Some(Fault::Network(s)) if *s == step => {
                return Err(TransportError::Timeout { url: exchange.path })
            }
            Some(Fault::Panic(s)) if *s == step => panic!("injected panic for {user}"),
            _ => {}
        }

        let index = item_index(item.as_deref());
        let reply = match (step, fault) {
            (Step::Authenticate, _) => self.login(&user, fault),
            (Step::Discover, _) => self.discover(&user, &exchange.path, fault),
            (Step::Submit, Some(Fault::SubmitStatus { item })) if index == Some(*item) => {
                Reply::empty(500)
            }
            (Step::Submit, Some(Fault::SubmitRejected { item })) if index == Some(*item) => {
                Reply::new(200, json!({ "success": false }))
            }
            (Step::Submit, _) => Reply::new(200, json!({ "success": true })),
            (Step::Confirm, Some(Fault::ConfirmStatus { item })) if index == Some(*item) => {
                Reply::empty(500)
            }
            (Step::Confirm, _) => Reply::new(200, json!({ "success": true, "result": {} })),
        };
        Ok(reply)
    }
}
