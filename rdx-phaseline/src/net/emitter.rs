//! The network emitter: best-effort delivery of haptic control messages.

use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::components::throttle::Throttle;
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::haptics::HapticFrame;

use super::protocol::HapticMessage;
use super::transport::{Connector, DatagramSocket, NetworkEndpoint, UdpConnector};

/// Counters exposed for status output and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterStats {
    /// Datagrams handed to the socket successfully.
    pub sent: u64,
    /// Messages abandoned after the retry also failed.
    pub dropped: u64,
    /// Times the socket was discarded and reopened after a failure.
    pub reopened: u64,
}

/// Tunables for a [`NetworkEmitter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterOptions {
    pub send_interval: Duration,
    pub intensity_multiplier: f32,
    pub frequency_multiplier: f32,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(100),
            intensity_multiplier: 1.0,
            frequency_multiplier: 1.0,
        }
    }
}

/// Translates sequencer state into datagrams for one UDP endpoint.
///
/// - `vibration` frames are throttled to one per `send_interval`. The newest
///   frame is kept as pending and goes out on the next allowed call.
/// - `start` and `end` bypass the throttle.
/// - The socket is opened lazily. A failed send discards it, reopens once and
///   resends; if that fails too, the message is logged and dropped.
///
/// The emitter is owned by the tick loop and never blocks it.
pub struct NetworkEmitter {
    connector: Box<dyn Connector>,
    socket: Option<Box<dyn DatagramSocket>>,
    options: EmitterOptions,
    throttle: Throttle,
    pending: Option<HapticFrame>,
    stats: EmitterStats,
    shut_down: bool,
}

impl NetworkEmitter {
    pub fn new(connector: Box<dyn Connector>, options: EmitterOptions) -> Self {
        Self {
            connector,
            socket: None,
            throttle: Throttle::new(options.send_interval),
            options,
            pending: None,
            stats: EmitterStats::default(),
            shut_down: false,
        }
    }

    /// Builds an emitter from configuration.
    ///
    /// Returns `None` when the network channel is disabled or the host does not
    /// resolve; the experience then runs without haptics.
    pub fn from_config(config: &NetworkConfig) -> Option<Self> {
        if !config.enabled {
            info!("network channel disabled by configuration");
            return None;
        }
        let endpoint = NetworkEndpoint::new(config.host.clone(), config.port);
        match UdpConnector::resolve(endpoint) {
            Ok(connector) => Some(Self::new(Box::new(connector), config.emitter_options())),
            Err(e) => {
                warn!(error = %e, "disabling network channel");
                None
            }
        }
    }

    pub fn endpoint(&self) -> &NetworkEndpoint {
        self.connector.endpoint()
    }

    pub fn stats(&self) -> EmitterStats {
        self.stats
    }

    /// The frame waiting for the throttle to open, if any.
    pub fn pending(&self) -> Option<HapticFrame> {
        self.pending
    }

    /// Sends `/start` immediately and reopens the vibration gate.
    pub fn send_start(&mut self) {
        self.pending = None;
        self.throttle.reset();
        self.transmit(HapticMessage::Start);
    }

    /// Sends `/end` followed by a zero vibration, both immediately.
    pub fn send_end(&mut self) {
        self.pending = None;
        self.transmit(HapticMessage::End);
        self.transmit(HapticMessage::Vibration(HapticFrame::ZERO));
        self.throttle.reset();
    }

    /// Records the latest frame and sends it if the throttle allows.
    pub fn update_vibration(&mut self, frame: HapticFrame, now: Duration) {
        self.pending = Some(frame);
        self.flush(now);
    }

    /// Sends the pending frame if one exists and the interval has elapsed.
    /// Returns `true` if a datagram went out.
    pub fn flush(&mut self, now: Duration) -> bool {
        if self.pending.is_none() || !self.throttle.try_fire(now) {
            return false;
        }
        match self.pending.take() {
            Some(frame) => {
                let message = HapticMessage::vibration(
                    frame,
                    self.options.intensity_multiplier,
                    self.options.frequency_multiplier,
                );
                self.transmit(message)
            }
            None => false,
        }
    }

    /// Leaves the device still: sends a zero vibration, then closes the socket.
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.pending = None;
        self.transmit(HapticMessage::Vibration(HapticFrame::ZERO));
        self.socket = None;
        self.shut_down = true;
        debug!(endpoint = %self.endpoint(), stats = ?self.stats, "network emitter shut down");
    }

    /// Sends one message with a single reopen-and-retry. Returns `true` on delivery
    /// to the socket.
    fn transmit(&mut self, message: HapticMessage) -> bool {
        let payload = message.encode();
        let first = match self.try_send(payload.as_bytes()) {
            Ok(()) => {
                self.stats.sent += 1;
                trace!(message = %payload, "datagram sent");
                return true;
            }
            Err(e) => e,
        };

        debug!(error = %first, kind = message.kind(), "send failed; reopening socket");
        self.socket = None;
        self.stats.reopened += 1;

        match self.try_send(payload.as_bytes()) {
            Ok(()) => {
                self.stats.sent += 1;
                trace!(message = %payload, "datagram sent after reopen");
                true
            }
            Err(second) => {
                warn!(
                    error = %second,
                    kind = message.kind(),
                    endpoint = %self.endpoint(),
                    "dropping haptic message"
                );
                self.socket = None;
                self.stats.dropped += 1;
                false
            }
        }
    }

    fn try_send(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        if self.socket.is_none() {
            self.socket = Some(self.connector.open()?);
        }
        if let Some(socket) = self.socket.as_mut() {
            socket.send(payload).map_err(NetworkError::Send)?;
        }
        Ok(())
    }
}

impl Drop for NetworkEmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for NetworkEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkEmitter")
            .field("endpoint", self.endpoint())
            .field("connected", &self.socket.is_some())
            .field("pending", &self.pending)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory connector used by unit and integration-style tests.

    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    /// Records every payload and can be told to fail the next `n` sends or opens.
    #[derive(Clone, Default)]
    pub struct RecordingConnector {
        pub sent: Arc<Mutex<Vec<String>>>,
        pub failing_sends: Arc<Mutex<u32>>,
        pub failing_opens: Arc<Mutex<u32>>,
        pub opens: Arc<Mutex<u32>>,
        endpoint: Option<NetworkEndpoint>,
    }

    impl RecordingConnector {
        pub fn new() -> Self {
            Self {
                endpoint: Some(NetworkEndpoint::new("test", 9000)),
                ..Self::default()
            }
        }

        pub fn payloads(&self) -> Vec<String> {
            self.sent.lock().clone()
        }

        pub fn fail_next_sends(&self, n: u32) {
            *self.failing_sends.lock() = n;
        }

        pub fn fail_next_opens(&self, n: u32) {
            *self.failing_opens.lock() = n;
        }
    }

    struct RecordingSocket {
        owner: RecordingConnector,
    }

    impl DatagramSocket for RecordingSocket {
        fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
            let mut failing = self.owner.failing_sends.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            self.owner
                .sent
                .lock()
                .push(String::from_utf8_lossy(payload).into_owned());
            Ok(payload.len())
        }
    }

    impl Connector for RecordingConnector {
        fn endpoint(&self) -> &NetworkEndpoint {
            self.endpoint.as_ref().expect("test connector has an endpoint")
        }

        fn open(&mut self) -> Result<Box<dyn DatagramSocket>, NetworkError> {
            *self.opens.lock() += 1;
            let mut failing = self.failing_opens.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(NetworkError::Open(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "no route",
                )));
            }
            Ok(Box::new(RecordingSocket {
                owner: self.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingConnector;
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn emitter(connector: &RecordingConnector) -> NetworkEmitter {
        NetworkEmitter::new(Box::new(connector.clone()), EmitterOptions::default())
    }

    fn vibrations(connector: &RecordingConnector) -> usize {
        connector
            .payloads()
            .iter()
            .filter(|p| p.starts_with("/vibration"))
            .count()
    }

    #[test]
    fn socket_opens_lazily_on_first_send() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        assert_eq!(*connector.opens.lock(), 0);
        emitter.send_start();
        assert_eq!(*connector.opens.lock(), 1);
        emitter.send_start();
        assert_eq!(*connector.opens.lock(), 1);
        assert_eq!(connector.payloads(), vec!["/start", "/start"]);
    }

    #[test]
    fn burst_within_half_interval_sends_one_datagram() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        for i in 0..10 {
            emitter.update_vibration(HapticFrame::new(0.1 * i as f32, 0.5), ms(i * 5));
        }
        assert_eq!(vibrations(&connector), 1);
        assert_eq!(connector.payloads()[0], "/vibration 0.00 0.50");
    }

    #[test]
    fn spaced_updates_each_send() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        for i in 0..5 {
            emitter.update_vibration(HapticFrame::new(0.5, 0.5), ms(i * 101));
        }
        assert_eq!(vibrations(&connector), 5);
    }

    #[test]
    fn latest_pending_frame_is_flushed_when_gate_reopens() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        emitter.update_vibration(HapticFrame::new(0.1, 0.1), ms(0));
        emitter.update_vibration(HapticFrame::new(0.2, 0.2), ms(30));
        emitter.update_vibration(HapticFrame::new(0.3, 0.3), ms(60));
        assert_eq!(emitter.pending(), Some(HapticFrame::new(0.3, 0.3)));
        assert!(!emitter.flush(ms(90)));
        assert!(emitter.flush(ms(100)));
        assert_eq!(
            connector.payloads(),
            vec!["/vibration 0.10 0.10", "/vibration 0.30 0.30"]
        );
        assert_eq!(emitter.pending(), None);
    }

    #[test]
    fn control_messages_bypass_the_throttle() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        emitter.update_vibration(HapticFrame::new(0.4, 0.4), ms(0));
        emitter.send_end();
        assert_eq!(
            connector.payloads(),
            vec!["/vibration 0.40 0.40", "/end", "/vibration 0.00 0.00"]
        );
    }

    #[test]
    fn one_failed_send_is_retried_on_a_fresh_socket() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        connector.fail_next_sends(1);
        emitter.send_start();
        assert_eq!(connector.payloads(), vec!["/start"]);
        assert_eq!(*connector.opens.lock(), 2);
        let stats = emitter.stats();
        assert_eq!((stats.sent, stats.reopened, stats.dropped), (1, 1, 0));
    }

    #[test]
    fn second_failure_drops_the_message() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        connector.fail_next_sends(2);
        emitter.send_start();
        assert!(connector.payloads().is_empty());
        assert_eq!(emitter.stats().dropped, 1);

        // The next message gets a fresh socket and goes through.
        emitter.send_end();
        assert_eq!(connector.payloads(), vec!["/end", "/vibration 0.00 0.00"]);
    }

    #[test]
    fn open_failure_is_treated_like_a_send_failure() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        connector.fail_next_opens(1);
        emitter.send_start();
        assert_eq!(connector.payloads(), vec!["/start"]);
        assert_eq!(emitter.stats().reopened, 1);
    }

    #[test]
    fn multipliers_scale_after_clamping() {
        let connector = RecordingConnector::new();
        let mut emitter = NetworkEmitter::new(
            Box::new(connector.clone()),
            EmitterOptions {
                intensity_multiplier: 0.5,
                frequency_multiplier: 2.0,
                ..EmitterOptions::default()
            },
        );
        emitter.update_vibration(HapticFrame::new(1.4, 0.25), ms(0));
        assert_eq!(connector.payloads(), vec!["/vibration 0.50 0.50"]);
    }

    #[test]
    fn shutdown_leaves_device_still_exactly_once() {
        let connector = RecordingConnector::new();
        let mut emitter = emitter(&connector);
        emitter.update_vibration(HapticFrame::new(0.9, 0.9), ms(0));
        emitter.shutdown();
        emitter.shutdown();
        drop(emitter);
        assert_eq!(
            connector.payloads(),
            vec!["/vibration 0.90 0.90", "/vibration 0.00 0.00"]
        );
    }
}
