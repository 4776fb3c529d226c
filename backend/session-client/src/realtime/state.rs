//! Connection lifecycle as a pure transition function.
//!
//! `ConnectionMachine::handle` owns no I/O: it mutates the status and returns the
//! effects the manager must carry out. Keeping it pure lets the reconnect bound
//! and the stale-event rules be tested without sockets or timers.

use crate::error::SessionError;
use resilience::BackoffPolicy;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable connection status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempts spent since the last successful open
    pub attempts: u32,
    pub last_error: Option<SessionError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// `explicit` is a caller-issued connect; only those may leave `Failed`
    Connect {
        enabled: bool,
        has_token: bool,
        explicit: bool,
    },
    ReconnectDue {
        has_token: bool,
    },
    Opened,
    OpenFailed(String),
    ChannelError(String),
    Closed {
        intentional: bool,
    },
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenChannel,
    CloseChannel,
    ScheduleReconnect(Duration),
    CancelReconnect,
    Exhausted(SessionError),
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    policy: BackoffPolicy,
    status: ConnectionStatus,
}

impl ConnectionMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            status: ConnectionStatus::default(),
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        use ConnectionState::*;

        match event {
            ConnectionEvent::Connect {
                enabled,
                has_token,
                explicit,
            } => {
                if !enabled || !has_token {
                    return Vec::new();
                }
                match self.status.state {
                    Connecting | Connected => Vec::new(),
                    Failed if !explicit => Vec::new(),
                    Failed => {
                        self.status.attempts = 0;
                        self.begin_open(Vec::new())
                    }
                    Reconnecting => self.begin_open(vec![Effect::CancelReconnect]),
                    Disconnected => self.begin_open(Vec::new()),
                }
            }

            ConnectionEvent::ReconnectDue { has_token } => {
                if self.status.state != Reconnecting {
                    return Vec::new();
                }
                if !has_token {
                    self.status.state = Disconnected;
                    self.status.attempts = 0;
                    return Vec::new();
                }
                self.begin_open(Vec::new())
            }

            ConnectionEvent::Opened => {
                if self.status.state != Connecting {
                    return Vec::new();
                }
                self.status.state = Connected;
                self.status.attempts = 0;
                self.status.last_error = None;
                Vec::new()
            }

            ConnectionEvent::OpenFailed(message) => {
                if self.status.state != Connecting {
                    return Vec::new();
                }
                self.status.last_error = Some(SessionError::ChannelError(message));
                self.after_unexpected_close()
            }

            ConnectionEvent::ChannelError(message) => {
                self.status.last_error = Some(SessionError::ChannelError(message));
                Vec::new()
            }

            ConnectionEvent::Closed { intentional } => {
                if !matches!(self.status.state, Connecting | Connected) {
                    return Vec::new();
                }
                if intentional {
                    self.status.state = Disconnected;
                    self.status.attempts = 0;
                    return Vec::new();
                }
                self.after_unexpected_close()
            }

            ConnectionEvent::Disconnect => {
                self.status.state = Disconnected;
                self.status.attempts = 0;
                vec![Effect::CancelReconnect, Effect::CloseChannel]
            }
        }
    }

    fn begin_open(&mut self, mut effects: Vec<Effect>) -> Vec<Effect> {
        self.status.state = ConnectionState::Connecting;
        effects.push(Effect::OpenChannel);
        effects
    }

    fn after_unexpected_close(&mut self) -> Vec<Effect> {
        if self.policy.allows(self.status.attempts) {
            self.status.attempts += 1;
            self.status.state = ConnectionState::Reconnecting;
            vec![Effect::ScheduleReconnect(
                self.policy.delay,
            )]
        } else {
            let error = SessionError::ReconnectExhausted {
                attempts: self.status.attempts,
            };
            self.status.state = ConnectionState::Failed;
            self.status.last_error = Some(error.clone());
            vec![Effect::Exhausted(error)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(BackoffPolicy::fixed(5, Duration::from_secs(3)))
    }

    fn connect() -> ConnectionEvent {
        ConnectionEvent::Connect {
            enabled: true,
            has_token: true,
            explicit: true,
        }
    }

    fn unexpected_close() -> ConnectionEvent {
        ConnectionEvent::Closed { intentional: false }
    }

    #[test]
    fn test_connect_opens_once() {
        let mut m = machine();

        assert_eq!(m.handle(connect()), vec![Effect::OpenChannel]);
        assert_eq!(m.state(), ConnectionState::Connecting);

        assert!(m.handle(connect()).is_empty());
        assert_eq!(m.status().attempts, 0);

        m.handle(ConnectionEvent::Opened);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert!(m.handle(connect()).is_empty());
    }

    #[test]
    fn test_connect_requires_enabled_and_token() {
        let mut m = machine();

        let disabled = ConnectionEvent::Connect {
            enabled: false,
            has_token: true,
            explicit: true,
        };
        let no_token = ConnectionEvent::Connect {
            enabled: true,
            has_token: false,
            explicit: true,
        };

        assert!(m.handle(disabled).is_empty());
        assert!(m.handle(no_token).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_reconnect_budget_is_bounded() {
        let mut m = machine();
        let mut opens = 0;

        let mut effects = m.handle(connect());
        loop {
            if effects.contains(&Effect::OpenChannel) {
                opens += 1;
                effects = m.handle(ConnectionEvent::OpenFailed("refused".into()));
                continue;
            }
            match effects.as_slice() {
                [Effect::ScheduleReconnect(delay)] => {
                    assert_eq!(*delay, Duration::from_secs(3));
                    effects = m.handle(ConnectionEvent::ReconnectDue { has_token: true });
                }
                [Effect::Exhausted(err)] => {
                    assert_eq!(*err, SessionError::ReconnectExhausted { attempts: 5 });
                    break;
                }
                other => panic!("unexpected effects {other:?}"),
            }
        }

        assert_eq!(opens, 6);
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.status().attempts, 5);
        assert!(m
            .handle(ConnectionEvent::ReconnectDue { has_token: true })
            .is_empty());
    }

    #[test]
    fn test_open_resets_attempts() {
        let mut m = machine();
        m.handle(connect());
        m.handle(ConnectionEvent::OpenFailed("refused".into()));
        m.handle(ConnectionEvent::ReconnectDue { has_token: true });
        assert_eq!(m.status().attempts, 1);

        m.handle(ConnectionEvent::Opened);
        assert_eq!(m.status().attempts, 0);
        assert_eq!(m.status().last_error, None);

        assert_eq!(
            m.handle(unexpected_close()),
            vec![Effect::ScheduleReconnect(Duration::from_secs(3))]
        );
        assert_eq!(m.status().attempts, 1);
    }

    #[test]
    fn test_intentional_close_disconnects() {
        let mut m = machine();
        m.handle(connect());
        m.handle(ConnectionEvent::Opened);

        assert!(m
            .handle(ConnectionEvent::Closed { intentional: true })
            .is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_cancels_reconnect() {
        let mut m = machine();
        m.handle(connect());
        m.handle(ConnectionEvent::OpenFailed("refused".into()));
        assert_eq!(m.state(), ConnectionState::Reconnecting);

        assert_eq!(
            m.handle(ConnectionEvent::Disconnect),
            vec![Effect::CancelReconnect, Effect::CloseChannel]
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.status().attempts, 0);

        // A timer that fired anyway is ignored
        assert!(m
            .handle(ConnectionEvent::ReconnectDue { has_token: true })
            .is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_explicit_connect_leaves_failed() {
        let mut m = ConnectionMachine::new(BackoffPolicy::fixed(0, Duration::from_secs(3)));
        m.handle(connect());
        m.handle(ConnectionEvent::OpenFailed("refused".into()));
        assert_eq!(m.state(), ConnectionState::Failed);

        let implicit = ConnectionEvent::Connect {
            enabled: true,
            has_token: true,
            explicit: false,
        };
        assert!(m.handle(implicit).is_empty());
        assert_eq!(m.handle(connect()), vec![Effect::OpenChannel]);
        assert_eq!(m.status().attempts, 0);
    }

    #[test]
    fn test_connect_while_reconnecting_skips_the_wait() {
        let mut m = machine();
        m.handle(connect());
        m.handle(ConnectionEvent::OpenFailed("refused".into()));

        assert_eq!(
            m.handle(connect()),
            vec![Effect::CancelReconnect, Effect::OpenChannel]
        );
        assert_eq!(m.status().attempts, 1);
    }

    #[test]
    fn test_channel_error_is_recorded_without_transition() {
        let mut m = machine();
        m.handle(connect());
        m.handle(ConnectionEvent::Opened);

        assert!(m
            .handle(ConnectionEvent::ChannelError("reset by peer".into()))
            .is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(
            m.status().last_error,
            Some(SessionError::ChannelError("reset by peer".into()))
        );
    }

    #[test]
    fn test_close_outside_connection_is_ignored() {
        let mut m = machine();
        assert!(m.handle(unexpected_close()).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_reconnect_without_token_gives_up_quietly() {
        let mut m = machine();
        m.handle(connect());
        m.handle(ConnectionEvent::OpenFailed("refused".into()));

        assert!(m
            .handle(ConnectionEvent::ReconnectDue { has_token: false })
            .is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }
}
