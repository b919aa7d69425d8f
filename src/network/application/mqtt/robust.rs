//! Automatic reconnect around the session client.
//!
//! A controller in the field has nobody to restart it, so [`RobustClient`]
//! turns transport failures during [`publish`](RobustClient::publish) and the
//! message checks into a reconnect followed by one more try of the same
//! operation. With the default [`LinearBackoff`] it keeps reconnecting for as
//! long as it takes.

use core::fmt;
use core::time::Duration;

use super::client::{Client, Incoming, MessageHandler, NoHandler, StatusHandler};
use super::packet::QoS;
use crate::network::Connect;
use crate::network::error::Error;
use crate::time::{Clock, Delay};

/// Decides which failures are worth a reconnect and how long to wait.
pub trait RetryPolicy {
    /// Whether `error`, returned by an operation on a connected client, should
    /// trigger a reconnect.
    ///
    /// By default only transport failures do. Failed reconnect attempts are
    /// not filtered here: they are always followed by the next attempt until
    /// [`RetryPolicy::backoff`] gives up.
    fn should_retry(&self, error: &Error) -> bool {
        error.is_transport()
    }

    /// Delay before reconnect attempt `attempt` (starting at 1), or `None`
    /// to give up.
    fn backoff(&self, attempt: u32) -> Option<Duration>;
}

/// Waits `step`, `2 * step`, `3 * step`, ... between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    /// Delay unit.
    pub step: Duration,
    /// Give up after this many attempts; `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl RetryPolicy for LinearBackoff {
    fn backoff(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt > max => None,
            _ => Some(self.step.saturating_mul(attempt)),
        }
    }
}

/// A [`Client`] that reconnects on transport failures.
///
/// `D` sleeps between attempts and `P` is the [`RetryPolicy`].
pub struct RobustClient<'a, N: Connect, K, D, M = NoHandler, S = NoHandler, P = LinearBackoff> {
    client: Client<'a, N, K, M, S>,
    delay: D,
    policy: P,
}

impl<'a, N, K, D, M, S> RobustClient<'a, N, K, D, M, S>
where
    N: Connect,
    N::Error: Into<Error>,
    K: Clock,
    D: Delay,
    M: MessageHandler,
    S: StatusHandler,
{
    /// Wraps `client`, retrying forever with one-second linear backoff.
    pub fn new(client: Client<'a, N, K, M, S>, delay: D) -> Self {
        Self::with_policy(client, delay, LinearBackoff::default())
    }
}

impl<'a, N, K, D, M, S, P> RobustClient<'a, N, K, D, M, S, P>
where
    N: Connect,
    N::Error: Into<Error>,
    K: Clock,
    D: Delay,
    M: MessageHandler,
    S: StatusHandler,
    P: RetryPolicy,
{
    /// Wraps `client` with a custom retry policy.
    pub fn with_policy(client: Client<'a, N, K, M, S>, delay: D, policy: P) -> Self {
        Self {
            client,
            delay,
            policy,
        }
    }

    /// [`Client::publish`], reconnecting and trying again on transport failure.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use greenfinger_mqtt::network::application::mqtt::{Client, Options, QoS, RobustClient};
    /// # use greenfinger_mqtt::time::Delay;
    /// # use core::time::Duration;
    /// # use greenfinger_mqtt::network::{Close, Connect, Connection, Read, Readiness, Remote, Write};
    /// # use greenfinger_mqtt::network::error::Error;
    /// # use greenfinger_mqtt::time::{Clock, Instant};
    /// # struct MockConnection;
    /// # impl Connection for MockConnection {}
    /// # impl Read for MockConnection {
    /// #     type Error = ();
    /// #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
    /// # }
    /// # impl Write for MockConnection {
    /// #     type Error = ();
    /// #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
    /// #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # impl Readiness for MockConnection {
    /// #     type Error = ();
    /// #     fn poll_read(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(false) }
    /// #     fn poll_write(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(true) }
    /// # }
    /// # impl Close for MockConnection {
    /// #     type Error = ();
    /// #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # struct MockConnector;
    /// # impl Connect for MockConnector {
    /// #     type Connection = MockConnection;
    /// #     type Error = Error;
    /// #     fn connect(&mut self, _r: &Remote<'_>) -> Result<MockConnection, Error> { Ok(MockConnection) }
    /// # }
    /// # struct MockClock;
    /// # impl Clock for MockClock { fn now(&self) -> Instant { Instant::from_millis(0) } }
    /// # struct MockDelay;
    /// # impl Delay for MockDelay { fn delay(&mut self, _d: Duration) {} }
    ///
    /// let client = Client::new(MockConnector, MockClock, Options::new("sensor_01", "10.0.0.2"));
    /// let mut robust = RobustClient::new(client, MockDelay);
    ///
    /// // Not connected yet: the first failure reconnects, then publishes.
    /// robust.publish("sensors/moisture", b"42", false, QoS::AtMostOnce)?;
    /// # Ok::<(), Error>(())
    /// ```
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
        qos: QoS,
    ) -> Result<Option<u16>, Error> {
        self.retry(|client| client.publish(topic, payload, retain, qos))
    }

    /// [`Client::check_message`], reconnecting and trying again on transport failure.
    pub fn check_message(&mut self) -> Result<Option<Incoming>, Error> {
        self.retry(|client| client.check_message())
    }

    /// [`Client::wait_message`], reconnecting and trying again on transport failure.
    pub fn wait_message(&mut self) -> Result<Option<Incoming>, Error> {
        self.retry(|client| client.wait_message())
    }

    /// Closes the current transport and reconnects without a clean session.
    ///
    /// Attempt `n` first waits `policy.backoff(n)`. Every failed attempt,
    /// including a refused CONNACK, is logged and followed by the next one;
    /// only the policy ends the loop.
    ///
    /// Returns the session-present flag of the new session.
    ///
    /// # Errors
    ///
    /// The error of the last attempt once `policy.backoff` returns `None`.
    pub fn reconnect(&mut self) -> Result<bool, Error> {
        self.client.close_transport();

        let mut last_error = Error::NotOpen;
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let Some(backoff) = self.policy.backoff(attempt) else {
                error!("giving up reconnecting after {} attempts", attempt - 1);
                return Err(last_error);
            };
            info!(
                "reconnect attempt {} in {} ms",
                attempt,
                backoff.as_millis() as u64
            );
            self.delay.delay(backoff);

            match self.client.connect(false) {
                Ok(session_present) => {
                    info!("reconnected after {} attempts", attempt);
                    return Ok(session_present);
                }
                Err(e) => {
                    warn!("reconnect attempt {} failed: {}", attempt, e);
                    last_error = e;
                }
            }
        }
    }

    /// The wrapped client.
    pub fn inner(&self) -> &Client<'a, N, K, M, S> {
        &self.client
    }

    /// The wrapped client, for operations that are not retried such as
    /// `connect`, `subscribe` and `ping`.
    pub fn inner_mut(&mut self) -> &mut Client<'a, N, K, M, S> {
        &mut self.client
    }

    /// Unwraps the client.
    pub fn into_inner(self) -> Client<'a, N, K, M, S> {
        self.client
    }

    fn retry<T, F>(&mut self, mut operation: F) -> Result<T, Error>
    where
        F: FnMut(&mut Client<'a, N, K, M, S>) -> Result<T, Error>,
    {
        loop {
            match operation(&mut self.client) {
                Err(e) if self.policy.should_retry(&e) => {
                    warn!("connection lost ({}), reconnecting", e);
                    self.reconnect()?;
                }
                result => return result,
            }
        }
    }
}

impl<N: Connect, K, D, M, S, P: fmt::Debug> fmt::Debug for RobustClient<'_, N, K, D, M, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobustClient")
            .field("client", &self.client)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_is_unbounded_by_default() {
        let policy = LinearBackoff::default();
        assert_eq!(policy.backoff(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.backoff(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.backoff(3), Some(Duration::from_secs(3)));
        assert_eq!(policy.backoff(10_000), Some(Duration::from_secs(10_000)));
    }

    #[test]
    fn test_linear_backoff_max_attempts() {
        let policy = LinearBackoff {
            step: Duration::from_millis(250),
            max_attempts: Some(2),
        };
        assert_eq!(policy.backoff(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.backoff(3), None);
    }

    #[test]
    fn test_default_retry_predicate() {
        let policy = LinearBackoff::default();
        assert!(policy.should_retry(&Error::ConnectionClosed));
        assert!(policy.should_retry(&Error::Timeout));
        assert!(policy.should_retry(&Error::NotOpen));
        assert!(!policy.should_retry(&Error::ProtocolViolation));
        assert!(!policy.should_retry(&Error::Configuration));
        assert!(!policy.should_retry(&Error::SubscriptionRejected));
    }
}
