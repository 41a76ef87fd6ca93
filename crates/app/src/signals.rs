use std::{collections::HashSet, fmt, str::FromStr, time::Duration};

use axum::response::sse::{Event, KeepAlive};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, warn};

/// Back-office areas whose screens react to each other's changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTopic {
    Customers,
    Employees,
    Jobs,
    PaySchedules,
    Positions,
    Permissions,
}

impl SignalTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalTopic::Customers => "customers",
            SignalTopic::Employees => "employees",
            SignalTopic::Jobs => "jobs",
            SignalTopic::PaySchedules => "pay_schedules",
            SignalTopic::Positions => "positions",
            SignalTopic::Permissions => "permissions",
        }
    }
}

impl FromStr for SignalTopic {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "customers" => Ok(SignalTopic::Customers),
            "employees" => Ok(SignalTopic::Employees),
            "jobs" => Ok(SignalTopic::Jobs),
            "pay_schedules" | "pay-schedules" => Ok(SignalTopic::PaySchedules),
            "positions" => Ok(SignalTopic::Positions),
            "permissions" => Ok(SignalTopic::Permissions),
            other => Err(format!("unknown topic '{other}'")),
        }
    }
}

impl fmt::Display for SignalTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Created,
    Updated,
    Deleted,
    Invalidated,
}

/// Notification that records under a topic changed and dependent views
/// should refetch.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub ts: DateTime<Utc>,
    pub topic: SignalTopic,
    pub action: SignalAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Signal {
    pub fn event_name(&self) -> &'static str {
        self.topic.as_str()
    }

    pub fn into_sse_event(self) -> Result<Event, serde_json::Error> {
        let data = serde_json::to_string(&self)?;
        Ok(Event::default().event(self.event_name()).data(data))
    }
}

/// Broadcast channel owned by the application state. Components publish
/// through a cloned handle instead of a process-wide registry.
#[derive(Clone)]
pub struct SignalHub {
    sender: broadcast::Sender<Signal>,
}

impl SignalHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the signal.
    pub fn publish(&self, signal: Signal) -> usize {
        let topic = signal.topic.as_str();
        counter!("signals_published_total", "topic" => topic).increment(1);
        match self.sender.send(signal) {
            Ok(receivers) => {
                debug!(stage = "signals", topic, receivers, "signal published");
                receivers
            }
            Err(_) => {
                debug!(stage = "signals", topic, "signal dropped without subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalFilter {
    topics: Option<HashSet<SignalTopic>>,
}

impl SignalFilter {
    pub fn from_topics(topics: Option<HashSet<SignalTopic>>) -> Self {
        Self { topics }
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        match &self.topics {
            Some(topics) => topics.contains(&signal.topic),
            None => true,
        }
    }
}

pub fn signal_stream(
    hub: &SignalHub,
    filter: SignalFilter,
) -> impl Stream<Item = Result<Event, serde_json::Error>> + Send + 'static {
    BroadcastStream::new(hub.subscribe()).filter_map(move |result| match result {
        Ok(signal) if filter.matches(&signal) => Some(signal.into_sse_event()),
        Ok(_) => None,
        Err(err) => {
            warn!(stage = "signals", error = %err, "subscriber lagged behind signal hub");
            None
        }
    })
}

pub fn signal_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(20))
        .text("heartbeat")
}

pub fn parse_topic_list(value: Option<String>) -> Result<Option<HashSet<SignalTopic>>, String> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let mut set = HashSet::new();
    for item in raw.split(',').filter(|s| !s.trim().is_empty()) {
        set.insert(item.parse::<SignalTopic>()?);
    }

    if set.is_empty() {
        Ok(None)
    } else {
        Ok(Some(set))
    }
}
