//! Scripted in-memory player for unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::bus::{create_bus, ChangeEvent, SharedBus};
use crate::player::{PlayerError, PlayerHandle, PlayerResult, PropertyValue};

/// A write or command the code under test sent to the player
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Set(String, Value),
    Command(String, Vec<Value>),
}

/// Properties not scripted answer `Unavailable`, like mpv does for unloaded state.
pub struct FakePlayer {
    values: Mutex<HashMap<String, PropertyValue>>,
    failing: HashSet<String>,
    failing_commands: HashSet<String>,
    delays: HashMap<String, Duration>,
    reads: Mutex<Vec<String>>,
    calls: Mutex<Vec<Call>>,
    bus: SharedBus,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            failing: HashSet::new(),
            failing_commands: HashSet::new(),
            delays: HashMap::new(),
            reads: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            bus: create_bus(),
        }
    }

    pub fn with(self, property: &str, value: impl Into<PropertyValue>) -> Self {
        self.set_value(property, value);
        self
    }

    /// Reads of `property` fail with a transport-style error
    pub fn failing(mut self, property: &str) -> Self {
        self.failing.insert(property.to_string());
        self
    }

    pub fn failing_command(mut self, name: &str) -> Self {
        self.failing_commands.insert(name.to_string());
        self
    }

    /// Reads of `property` take `delay` before answering
    pub fn delayed(mut self, property: &str, delay: Duration) -> Self {
        self.delays.insert(property.to_string(), delay);
        self
    }

    pub fn set_value(&self, property: &str, value: impl Into<PropertyValue>) {
        self.values
            .lock()
            .unwrap()
            .insert(property.to_string(), value.into());
    }

    pub fn was_read(&self, property: &str) -> bool {
        self.reads.lock().unwrap().iter().any(|p| p == property)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn publish(&self, event: ChangeEvent) {
        self.bus.publish(event);
    }
}

#[async_trait]
impl PlayerHandle for FakePlayer {
    async fn get(&self, property: &str) -> PlayerResult<PropertyValue> {
        self.reads.lock().unwrap().push(property.to_string());

        if let Some(delay) = self.delays.get(property) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(property) {
            return Err(PlayerError::Mpv("simulated failure".to_string()));
        }

        let value = self.values.lock().unwrap().get(property).cloned();
        value.ok_or_else(|| PlayerError::Unavailable(property.to_string()))
    }

    async fn set(&self, property: &str, value: Value) -> PlayerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Set(property.to_string(), value.clone()));
        self.set_value(property, PropertyValue::from(value));
        Ok(())
    }

    async fn command(&self, name: &str, args: Vec<Value>) -> PlayerResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Command(name.to_string(), args));
        if self.failing_commands.contains(name) {
            return Err(PlayerError::Mpv("simulated failure".to_string()));
        }
        Ok(Value::Null)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }
}
