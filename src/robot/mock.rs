use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RobotError;

use super::{Board, Extra, GpioPin};

/// In-memory board whose pins record every call made against them.
pub struct MockBoard {
    name: String,
    pins: HashMap<String, Arc<MockPin>>,
}

#[derive(Default)]
pub struct MockPin {
    state: Mutex<bool>,
    sets: Mutex<Vec<(bool, Extra)>>,
    gets: Mutex<Vec<Extra>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockBoard {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pins: HashMap::new(),
        }
    }

    pub fn with_pin(mut self, name: &str, high: bool) -> Self {
        let pin = MockPin {
            state: Mutex::new(high),
            ..Default::default()
        };
        self.pins.insert(name.to_string(), Arc::new(pin));
        self
    }

    /// A pin whose every call fails with a remote error.
    pub fn with_failing_pin(mut self, name: &str, message: &str) -> Self {
        let pin = MockPin {
            failure: Some(message.to_string()),
            ..Default::default()
        };
        self.pins.insert(name.to_string(), Arc::new(pin));
        self
    }

    /// A pin that takes `delay` to answer.
    pub fn with_slow_pin(mut self, name: &str, delay: Duration) -> Self {
        let pin = MockPin {
            delay: Some(delay),
            ..Default::default()
        };
        self.pins.insert(name.to_string(), Arc::new(pin));
        self
    }

    pub fn pin(&self, name: &str) -> Arc<MockPin> {
        Arc::clone(&self.pins[name])
    }
}

impl MockPin {
    pub fn is_high(&self) -> bool {
        *self.state.lock().unwrap()
    }

    pub fn sets(&self) -> Vec<(bool, Extra)> {
        self.sets.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<Extra> {
        self.gets.lock().unwrap().clone()
    }

    async fn answer(&self) -> Result<(), RobotError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(RobotError::Remote {
                code: "unavailable".into(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Board for MockBoard {
    type Pin = Arc<MockPin>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn gpio_pin_by_name(&self, name: &str) -> Result<Arc<MockPin>, RobotError> {
        self.pins
            .get(name)
            .cloned()
            .ok_or_else(|| RobotError::NotFound {
                kind: "gpio pin",
                name: name.to_string(),
            })
    }
}

impl GpioPin for Arc<MockPin> {
    async fn get(&self, extra: &Extra) -> Result<bool, RobotError> {
        self.gets.lock().unwrap().push(extra.clone());
        self.answer().await?;
        Ok(self.is_high())
    }

    async fn set(&self, high: bool, extra: &Extra) -> Result<(), RobotError> {
        self.sets.lock().unwrap().push((high, extra.clone()));
        self.answer().await?;
        *self.state.lock().unwrap() = high;
        Ok(())
    }
}
