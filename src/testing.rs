//! In-memory transports and fixtures for tests.

use crate::error::FetchError;
use crate::fetch::{Connector, PageResponse, RetryPolicy, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Retry policy with no waiting, for tests.
pub fn fast_policy(retry_budget: usize) -> RetryPolicy {
    RetryPolicy {
        retry_budget,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: Duration::ZERO,
    }
}

type Scripted = Result<(u16, &'static str), FetchError>;

/// Replays a fixed sequence of responses, one per call, and counts calls.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<PageResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok((status, body))) => Ok(PageResponse {
                status,
                body: body.to_string(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(FetchError::Connect {
                url: url.to_string(),
                reason: "script exhausted".into(),
            }),
        }
    }
}

/// Serves pages from a fixed URL → HTML map; unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct StaticSite {
    pages: Arc<HashMap<String, String>>,
    hits: Arc<Mutex<Vec<String>>>,
    connects: Arc<AtomicUsize>,
}

impl StaticSite {
    pub fn new<I, K, V>(pages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pages: Arc::new(
                pages
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Every URL requested so far, in request order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    /// How many transports were built, i.e. how many workers started.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for StaticSite {
    async fn get(&self, url: &str) -> Result<PageResponse, FetchError> {
        self.hits.lock().unwrap().push(url.to_string());
        Ok(match self.pages.get(url) {
            Some(body) => PageResponse {
                status: 200,
                body: body.clone(),
            },
            None => PageResponse {
                status: 404,
                body: String::new(),
            },
        })
    }
}

impl Connector for StaticSite {
    type Transport = StaticSite;

    fn connect(&self) -> Result<StaticSite, FetchError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.clone())
    }
}
