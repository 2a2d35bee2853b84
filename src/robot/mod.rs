pub mod client;
#[cfg(test)]
pub mod mock;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::RobotError;

/// Opaque per-call parameters passed straight through to the robot service.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// A resource exposed by the remote robot, e.g. `rdk:component:board/board-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceName {
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: String,
    pub name: String,
}

impl ResourceName {
    pub fn is_board(&self) -> bool {
        self.namespace == "rdk" && self.kind == "component" && self.subtype == "board"
    }
}

/// A named collection of GPIO pins on the robot.
pub trait Board: Send + Sync + 'static {
    type Pin: GpioPin;

    fn name(&self) -> &str;

    /// Resolve a pin by name. Unknown names fail with [`RobotError::NotFound`].
    fn gpio_pin_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Self::Pin, RobotError>> + Send;
}

/// A single boolean hardware line.
pub trait GpioPin: Send + Sync {
    fn get(&self, extra: &Extra) -> impl Future<Output = Result<bool, RobotError>> + Send;

    fn set(
        &self,
        high: bool,
        extra: &Extra,
    ) -> impl Future<Output = Result<(), RobotError>> + Send;
}
