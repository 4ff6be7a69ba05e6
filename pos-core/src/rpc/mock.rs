//! Scripted transport for tests
//!
//! Records every call and pops scripted responses in order; with no script
//! left it serves the fallback value, or fails the call.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{RpcError, RpcTransport};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub method: String,
    pub args: Value,
    pub kwargs: Value,
}

#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Value, RpcError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    fallback: Option<Value>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` whenever the scripted queue is empty
    pub fn with_fallback(value: Value) -> Self {
        Self {
            fallback: Some(value),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, value: Value) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, error: RpcError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            method: method.to_string(),
            args,
            kwargs,
        });

        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        match &self.fallback {
            Some(value) => Ok(value.clone()),
            None => Err(RpcError::Transport(
                "mock transport has no scripted response".into(),
            )),
        }
    }
}
