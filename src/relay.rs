//! Translation between relay requests and GPIO calls on a board.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RobotError};
use crate::robot::{Board, Extra, GpioPin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinState {
    High,
    Low,
}

impl PinState {
    pub fn as_str(self) -> &'static str {
        match self {
            PinState::High => "high",
            PinState::Low => "low",
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinState {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(PinState::High),
            "low" => Ok(PinState::Low),
            other => Err(RelayError::InvalidPinState(other.to_string())),
        }
    }
}

impl From<bool> for PinState {
    fn from(high: bool) -> Self {
        if high { PinState::High } else { PinState::Low }
    }
}

impl From<PinState> for bool {
    fn from(state: PinState) -> Self {
        state == PinState::High
    }
}

/// Body of a relay call. Absent fields take their zero value; `pin_state` is
/// kept as sent and only checked when a state is applied.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RelayRequest {
    /// Advisory only.
    pub action: String,
    pub pin_num: i64,
    pub pin_state: Option<String>,
    pub extra: Option<Extra>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub pin_num: i64,
    pub pin_state: PinState,
}

/// Boards index pins by name; a pin number is looked up by its decimal form.
pub fn pin_name(pin_num: i64) -> String {
    pin_num.to_string()
}

pub struct Relay<B> {
    board: B,
    call_timeout: Option<Duration>,
}

impl<B: Board> Relay<B> {
    pub fn new(board: B, call_timeout: Option<Duration>) -> Self {
        Self {
            board,
            call_timeout,
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub async fn get_pin_state(&self, pin_num: i64, extra: &Extra) -> Result<PinState, RelayError> {
        let name = pin_name(pin_num);
        let high = self
            .bounded(&name, async {
                let pin = self.board.gpio_pin_by_name(&name).await?;
                pin.get(extra).await
            })
            .await?;
        Ok(high.into())
    }

    /// Apply `state` to the pin. The state is validated before the board is
    /// touched. Returns the applied state.
    pub async fn set_pin_state(
        &self,
        pin_num: i64,
        state: &str,
        extra: &Extra,
    ) -> Result<PinState, RelayError> {
        let state: PinState = state.parse()?;
        let name = pin_name(pin_num);
        self.bounded(&name, async {
            let pin = self.board.gpio_pin_by_name(&name).await?;
            pin.set(state.into(), extra).await
        })
        .await?;
        Ok(state)
    }

    async fn bounded<T>(
        &self,
        pin: &str,
        call: impl Future<Output = Result<T, RobotError>>,
    ) -> Result<T, RelayError> {
        match self.call_timeout {
            None => Ok(call.await?),
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(RelayError::Timeout {
                    pin: pin.to_string(),
                    timeout,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::mock::MockBoard;
    use serde_json::json;

    fn board() -> MockBoard {
        MockBoard::new("board-1")
            .with_pin("37", false)
            .with_pin("-4", true)
            .with_failing_pin("12", "i2c bus error")
    }

    #[test]
    fn pin_state_round_trips() {
        for s in ["high", "low"] {
            let state: PinState = s.parse().unwrap();
            let high: bool = state.into();
            assert_eq!(PinState::from(high).as_str(), s);
            assert_eq!(serde_json::to_value(state).unwrap(), json!(s));
        }
    }

    #[test]
    fn unknown_pin_states_are_rejected() {
        for s in ["", "HIGH", "on", "1", "true"] {
            assert!(
                matches!(s.parse::<PinState>(), Err(RelayError::InvalidPinState(ref v)) if v == s),
                "{s:?} accepted"
            );
        }
    }

    #[test]
    fn request_fields_default_when_absent() {
        let req: RelayRequest = serde_json::from_str(r#"{"pin_num": 5}"#).unwrap();
        assert_eq!(req.pin_num, 5);
        assert_eq!(req.action, "");
        assert_eq!(req.pin_state, None);
        assert_eq!(req.extra, None);

        let req: RelayRequest =
            serde_json::from_str(r#"{"action":"set","pin_num":37,"pin_state":"bogus","extra":{"k":1}}"#)
                .unwrap();
        assert_eq!(req.pin_state.as_deref(), Some("bogus"));
        assert_eq!(req.extra.unwrap()["k"], json!(1));
    }

    #[test]
    fn pin_names_are_decimal() {
        assert_eq!(pin_name(37), "37");
        assert_eq!(pin_name(0), "0");
        assert_eq!(pin_name(-4), "-4");
    }

    #[tokio::test]
    async fn set_drives_named_pin() {
        let relay = Relay::new(board(), None);
        let mut extra = Extra::new();
        extra.insert("duration_ms".into(), json!(250));

        let applied = relay.set_pin_state(37, "high", &extra).await.unwrap();

        assert_eq!(applied, PinState::High);
        let pin = relay.board().pin("37");
        assert_eq!(pin.sets(), vec![(true, extra)]);
        assert!(pin.is_high());
    }

    #[tokio::test]
    async fn invalid_state_never_reaches_the_pin() {
        let relay = Relay::new(board(), None);
        let err = relay
            .set_pin_state(37, "medium", &Extra::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidPinState(_)));
        assert!(relay.board().pin("37").sets().is_empty());
    }

    #[tokio::test]
    async fn get_reports_pin_level() {
        let relay = Relay::new(board(), None);
        assert_eq!(
            relay.get_pin_state(37, &Extra::new()).await.unwrap(),
            PinState::Low
        );
        assert_eq!(
            relay.get_pin_state(-4, &Extra::new()).await.unwrap(),
            PinState::High
        );
        assert_eq!(relay.board().pin("37").gets().len(), 1);
    }

    #[tokio::test]
    async fn unknown_pin_is_not_found() {
        let relay = Relay::new(board(), None);
        let err = relay.get_pin_state(99, &Extra::new()).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Robot(RobotError::NotFound { ref name, .. }) if name == "99"
        ));
    }

    #[tokio::test]
    async fn remote_failures_surface() {
        let relay = Relay::new(board(), None);
        let err = relay
            .set_pin_state(12, "low", &Extra::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("i2c bus error"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_are_bounded_when_configured() {
        let board = MockBoard::new("board-1").with_slow_pin("7", Duration::from_secs(10));
        let relay = Relay::new(board, Some(Duration::from_secs(1)));
        let err = relay.get_pin_state(7, &Extra::new()).await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout { ref pin, .. } if pin == "7"));
    }
}
