//! Push Channel Client
//!
//! [`PushChannel`] is a cheap handle onto a single connection task. The task
//! owns the link, the handshake/heartbeat deadline and the one reconnect
//! timer, so every state transition happens in one place.

use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, warn};

use super::backoff::{Backoff, ChannelState, ChannelStatus, ReconnectDecision, ReconnectPolicy};
use super::messages::{ChannelEvent, ClientEvent, ServerEvent};
use super::protocol::{self, Packet, SocketPacket};
use super::transport::{Link, Transport};
use super::ChannelError;
use crate::api::StreamId;
use crate::config::SocketConfig;

/// Heartbeat used until the server's handshake says otherwise
const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(45_000);

/// Push channel settings
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub namespace: String,
    pub policy: ReconnectPolicy,
    /// Bound on transport open plus handshake
    pub connect_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::from_config(&SocketConfig::default())
    }
}

impl ChannelOptions {
    pub fn from_config(config: &SocketConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            policy: ReconnectPolicy {
                max_attempts: config.max_reconnect_attempts,
                base_delay: config.reconnect_base_delay(),
            },
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Emit(ClientEvent),
}

/// Handle to the push channel task
#[derive(Clone)]
pub struct PushChannel {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChannelStatus>,
}

impl PushChannel {
    /// Spawn the connection task. The channel starts `Disconnected`.
    ///
    /// Stream events are delivered, in arrival order, on the returned receiver.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        options: ChannelOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::default());

        let task = ChannelTask {
            transport,
            backoff: Backoff::new(options.policy),
            options,
            state: ChannelState::Disconnected,
            heartbeat: DEFAULT_HEARTBEAT,
            link: None,
            opening: None,
            deadline: None,
            reconnect: None,
            commands: cmd_rx,
            events: event_tx,
            status: status_tx,
        };
        tokio::spawn(task.run());

        (
            Self {
                commands: cmd_tx,
                status: status_rx,
            },
            event_rx,
        )
    }

    pub fn connect(&self) -> Result<(), ChannelError> {
        self.command(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<(), ChannelError> {
        self.command(Command::Disconnect)
    }

    /// Dropped unless connected
    pub fn join_stream(&self, stream_id: &StreamId) -> Result<(), ChannelError> {
        self.command(Command::Emit(ClientEvent::JoinStream(stream_id.clone())))
    }

    /// Dropped unless connected
    pub fn leave_stream(&self, stream_id: &StreamId) -> Result<(), ChannelError> {
        self.command(Command::Emit(ClientEvent::LeaveStream(stream_id.clone())))
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Subscribe to status changes
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    fn command(&self, command: Command) -> Result<(), ChannelError> {
        self.commands.send(command).map_err(|_| ChannelError::Closed)
    }
}

type OpenFuture = Pin<Box<dyn Future<Output = Result<Link, ChannelError>> + Send>>;

struct ChannelTask {
    transport: Arc<dyn Transport>,
    options: ChannelOptions,
    backoff: Backoff,
    state: ChannelState,
    heartbeat: Duration,
    link: Option<Link>,
    opening: Option<OpenFuture>,
    /// Handshake deadline while connecting, heartbeat deadline while connected
    deadline: Option<Pin<Box<Sleep>>>,
    reconnect: Option<Pin<Box<Sleep>>>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    status: watch::Sender<ChannelStatus>,
}

impl ChannelTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                opened = wait_opening(&mut self.opening) => {
                    self.opening = None;
                    self.on_opened(opened);
                }
                frame = next_frame(&mut self.link) => {
                    match frame {
                        Some(frame) => self.handle_frame(&frame),
                        None => self.on_link_closed(),
                    }
                }
                _ = fire(&mut self.deadline) => {
                    self.deadline = None;
                    self.on_deadline();
                }
                _ = fire(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.on_reconnect_timer();
                }
            }
        }

        self.teardown();
        debug!("Push channel task stopped");
    }

    // ============================================
    // Commands
    // ============================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.on_connect_requested(),
            Command::Disconnect => self.on_disconnect_requested(),
            Command::Emit(event) => self.send_event(event),
        }
    }

    fn on_connect_requested(&mut self) {
        match self.state {
            ChannelState::Connecting | ChannelState::Connected => {
                debug!(state = %self.state, "Connect ignored");
            }
            ChannelState::Failed => {
                info!("Reconnecting after failure");
                self.backoff.reset();
                self.start_connect();
            }
            ChannelState::Disconnected => {
                self.reconnect = None;
                // Reached by disconnect() after giving up
                if self.backoff.is_exhausted() {
                    self.backoff.reset();
                }
                self.start_connect();
            }
        }
    }

    fn on_disconnect_requested(&mut self) {
        let previous = self.state;
        if previous == ChannelState::Connected {
            if let Some(link) = &self.link {
                let _ = link.send(protocol::encode_disconnect(&self.options.namespace));
            }
        }
        self.teardown();
        self.reconnect = None;
        self.state = ChannelState::Disconnected;
        self.publish();

        match previous {
            ChannelState::Connecting | ChannelState::Connected => {
                info!("Push channel disconnected");
            }
            _ => debug!(state = %previous, "Disconnect requested while not connected"),
        }
    }

    fn send_event(&mut self, event: ClientEvent) {
        let link = match (&self.link, self.state) {
            (Some(link), ChannelState::Connected) => link,
            _ => {
                debug!(event = event.name(), state = %self.state, "Not connected, dropping event");
                return;
            }
        };

        let frame = protocol::encode_event(&self.options.namespace, event.name(), &event.payload());
        if link.send(frame).is_err() {
            debug!(event = event.name(), "Link closed, dropping event");
        }
    }

    // ============================================
    // Connection lifecycle
    // ============================================

    fn start_connect(&mut self) {
        self.teardown();
        self.state = ChannelState::Connecting;
        self.heartbeat = DEFAULT_HEARTBEAT;

        let transport = Arc::clone(&self.transport);
        self.opening = Some(Box::pin(async move { transport.open().await }));
        self.deadline = Some(Box::pin(sleep(self.options.connect_timeout)));
        self.publish();

        debug!(attempt = self.backoff.attempts(), "Opening push channel");
    }

    fn on_opened(&mut self, opened: Result<Link, ChannelError>) {
        match opened {
            Ok(link) => {
                // Wait for the Engine.IO open packet before joining the namespace
                self.link = Some(link);
            }
            Err(e) => self.on_connect_error(&e.to_string()),
        }
    }

    fn on_link_closed(&mut self) {
        match self.state {
            ChannelState::Connected => self.on_disconnected("transport closed"),
            _ => self.on_connect_error("transport closed during handshake"),
        }
    }

    fn on_deadline(&mut self) {
        match self.state {
            ChannelState::Connecting => self.on_connect_error("handshake timed out"),
            ChannelState::Connected => self.on_disconnected("heartbeat timed out"),
            _ => {}
        }
    }

    fn on_reconnect_timer(&mut self) {
        if self.state == ChannelState::Disconnected {
            info!(attempt = self.backoff.attempts(), "Reconnecting push channel");
            self.start_connect();
        } else {
            self.publish();
        }
    }

    fn on_connected(&mut self) {
        self.state = ChannelState::Connected;
        self.backoff.reset();
        self.deadline = Some(Box::pin(sleep(self.heartbeat)));
        self.publish();
        info!(namespace = %self.options.namespace, "Push channel connected");
    }

    fn on_connect_error(&mut self, reason: &str) {
        warn!(reason, "Push channel connect error");
        self.teardown();
        self.state = ChannelState::Disconnected;
        self.evaluate_reconnect();
    }

    fn on_disconnected(&mut self, reason: &str) {
        warn!(reason, "Push channel disconnected");
        self.teardown();
        self.state = ChannelState::Disconnected;
        self.evaluate_reconnect();
    }

    fn evaluate_reconnect(&mut self) {
        // Failures only come from an open attempt, and every attempt starts
        // after the pending timer fired or was cancelled.
        debug_assert!(self.reconnect.is_none(), "reconnect timer already pending");

        match self.backoff.next() {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    attempt,
                    max_attempts = self.backoff.policy().max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.reconnect = Some(Box::pin(sleep(delay)));
            }
            ReconnectDecision::GiveUp { attempts } => {
                self.state = ChannelState::Failed;
                error!(attempts, "Max reconnection attempts reached");
            }
        }
        self.publish();
    }

    /// Drop the link and any in-flight open; the reconnect timer is left alone
    fn teardown(&mut self) {
        self.link = None;
        self.opening = None;
        self.deadline = None;
    }

    fn publish(&self) {
        self.status.send_replace(ChannelStatus {
            state: self.state,
            attempts: self.backoff.attempts(),
            reconnect_pending: self.reconnect.is_some(),
        });
    }

    // ============================================
    // Inbound frames
    // ============================================

    fn handle_frame(&mut self, frame: &str) {
        let packet = match protocol::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match packet {
            Packet::Open(handshake) => {
                debug!(sid = %handshake.sid, "Engine.IO open");
                self.heartbeat = handshake.heartbeat_timeout();
                self.send_raw(protocol::encode_connect(&self.options.namespace));
            }
            Packet::Ping(payload) => {
                self.send_raw(protocol::encode_pong(&payload));
                if self.state == ChannelState::Connected {
                    self.deadline = Some(Box::pin(sleep(self.heartbeat)));
                }
            }
            Packet::Close => self.on_link_closed(),
            Packet::Pong(_) | Packet::Noop => {}
            Packet::Message(packet) => self.handle_socket_packet(packet),
        }
    }

    fn handle_socket_packet(&mut self, packet: SocketPacket) {
        if packet.namespace() != self.options.namespace {
            debug!(namespace = packet.namespace(), "Ignoring packet for other namespace");
            return;
        }

        match packet {
            SocketPacket::Connect { .. } => {
                if self.state == ChannelState::Connecting {
                    self.on_connected();
                }
            }
            SocketPacket::ConnectError { message, .. } => self.on_connect_error(&message),
            SocketPacket::Disconnect { .. } => {
                if self.state == ChannelState::Connected {
                    self.on_disconnected("server disconnect");
                } else {
                    self.on_connect_error("server disconnect");
                }
            }
            SocketPacket::Event { name, data, .. } => {
                if self.state != ChannelState::Connected {
                    debug!(event = %name, "Event before namespace connect, dropped");
                    return;
                }
                self.dispatch_event(&name, data);
            }
            SocketPacket::Ack { ack_id, .. } => {
                debug!(ack_id, "Unexpected ack");
            }
        }
    }

    fn dispatch_event(&mut self, name: &str, data: serde_json::Value) {
        let event = match ServerEvent::parse(name, data) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = name, error = %e, "Malformed server event");
                return;
            }
        };

        match &event {
            ServerEvent::Connected => debug!("Server greeting received"),
            ServerEvent::JoinedStream { stream_id } => info!(%stream_id, "Joined stream"),
            ServerEvent::LeftStream { stream_id } => info!(%stream_id, "Left stream"),
            ServerEvent::Other { name } => debug!(event = %name, "Unhandled server event"),
            _ => {}
        }

        if let Some(event) = event.into_channel_event(Utc::now()) {
            if self.events.send(event).is_err() {
                debug!("Event receiver dropped");
            }
        }
    }

    fn send_raw(&self, frame: String) {
        if let Some(link) = &self.link {
            if link.send(frame).is_err() {
                debug!("Link closed while sending");
            }
        }
    }
}

async fn wait_opening(opening: &mut Option<OpenFuture>) -> Result<Link, ChannelError> {
    match opening {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(link: &mut Option<Link>) -> Option<String> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    const OPEN: &str =
        r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    enum Script {
        Accept,
        Fail,
    }

    /// Server side of an accepted mock link
    struct ServerEnd {
        from_client: mpsc::UnboundedReceiver<String>,
        to_client: mpsc::UnboundedSender<String>,
    }

    struct MockTransport {
        opens: AtomicUsize,
        script: Mutex<VecDeque<Script>>,
        servers: mpsc::UnboundedSender<ServerEnd>,
    }

    impl MockTransport {
        fn new(script: Vec<Script>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Arc::new(Self {
                opens: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                servers: tx,
            });
            (transport, rx)
        }

        fn push(&self, step: Script) {
            self.script.lock().unwrap().push_back(step);
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&self) -> Result<Link, ChannelError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Fail);
            match step {
                Script::Fail => Err(ChannelError::Transport("connection refused".into())),
                Script::Accept => {
                    let (out_tx, out_rx) = mpsc::unbounded_channel();
                    let (in_tx, in_rx) = mpsc::unbounded_channel();
                    let _ = self.servers.send(ServerEnd {
                        from_client: out_rx,
                        to_client: in_tx,
                    });
                    Ok(Link::new(out_tx, in_rx))
                }
            }
        }
    }

    fn spawn(transport: Arc<MockTransport>) -> (PushChannel, mpsc::UnboundedReceiver<ChannelEvent>) {
        PushChannel::spawn(transport, ChannelOptions::default())
    }

    async fn handshake(server: &mut ServerEnd) {
        server.to_client.send(OPEN.to_string()).unwrap();
        assert_eq!(server.from_client.recv().await.unwrap(), "40/video,");
        server
            .to_client
            .send(r#"40/video,{"sid":"ns-abc"}"#.to_string())
            .unwrap();
    }

    async fn wait_state(channel: &PushChannel, state: ChannelState) -> ChannelStatus {
        let mut rx = channel.watch_status();
        let status = *rx.wait_for(|s| s.state == state).await.unwrap();
        status
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (transport, _servers) = MockTransport::new(vec![]);
        let (channel, _events) = spawn(transport.clone());

        let start = Instant::now();
        channel.connect().unwrap();
        let status = wait_state(&channel, ChannelState::Failed).await;

        // 1 initial open plus 5 retries after 2+4+6+8+10 seconds
        assert_eq!(transport.opens(), 6);
        assert_eq!(status.attempts, 5);
        assert!(!status.reconnect_pending);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));

        // Terminal: no automatic connect afterwards
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.opens(), 6);
        assert_eq!(channel.status().state, ChannelState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_from_failed_recovers() {
        let (transport, mut servers) = MockTransport::new(vec![]);
        let (channel, _events) = spawn(transport.clone());

        channel.connect().unwrap();
        wait_state(&channel, ChannelState::Failed).await;

        transport.push(Script::Accept);
        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;

        let status = wait_state(&channel, ChannelState::Connected).await;
        assert_eq!(status.attempts, 0);
        assert_eq!(transport.opens(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_then_connect_from_failed_retries_again() {
        let (transport, _servers) = MockTransport::new(vec![]);
        let (channel, _events) = spawn(transport.clone());

        channel.connect().unwrap();
        wait_state(&channel, ChannelState::Failed).await;

        channel.disconnect().unwrap();
        let status = wait_state(&channel, ChannelState::Disconnected).await;
        assert_eq!(status.attempts, 5);

        // Same fresh budget as a direct connect from Failed
        channel.connect().unwrap();
        let mut rx = channel.watch_status();
        let status = *rx.wait_for(|s| s.reconnect_pending).await.unwrap();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.state, ChannelState::Disconnected);
        assert_eq!(transport.opens(), 7);

        let status = wait_state(&channel, ChannelState::Failed).await;
        assert_eq!(status.attempts, 5);
        assert_eq!(transport.opens(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_when_idle_keeps_state() {
        let (transport, _servers) = MockTransport::new(vec![]);
        let (channel, _events) = spawn(transport.clone());

        channel.disconnect().unwrap();
        channel.disconnect().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(channel.status(), ChannelStatus::default());
        assert_eq!(transport.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_and_join() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport);

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;
        wait_state(&channel, ChannelState::Connected).await;
        assert!(channel.is_connected());

        channel.join_stream(&StreamId::from(1)).unwrap();
        assert_eq!(
            server.from_client.recv().await.unwrap(),
            r#"42/video,["join_stream",{"stream_id":"1"}]"#
        );

        channel.leave_stream(&StreamId::from("1")).unwrap();
        assert_eq!(
            server.from_client.recv().await.unwrap(),
            r#"42/video,["leave_stream",{"stream_id":"1"}]"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_answered_with_pong() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport);

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;
        wait_state(&channel, ChannelState::Connected).await;

        server.to_client.send("2".to_string()).unwrap();
        assert_eq!(server.from_client.recv().await.unwrap(), "3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_events_forwarded_in_order() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, mut events) = spawn(transport);

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;
        wait_state(&channel, ChannelState::Connected).await;

        let frames = [
            r#"42/video,["joined_stream",{"stream_id":"s1"}]"#,
            r#"42/video,["stream_data",{"stream_id":"s1","frame":"AAAA","ai_results":{"detections":[]},"fps":15.0,"timestamp":1714557600.0}]"#,
            r#"42/video,["stream_error",{"stream_id":"s1","error":"decode failed"}]"#,
            r#"42/video,["stream_stopped",{"stream_id":"s1"}]"#,
        ];
        for frame in frames {
            server.to_client.send(frame.to_string()).unwrap();
        }

        match events.recv().await.unwrap() {
            ChannelEvent::StreamData { frame, .. } => {
                assert_eq!(frame.stream_id, StreamId::from("s1"));
                assert_eq!(frame.fps, 15.0);
            }
            other => panic!("Expected StreamData, got {other:?}"),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::StreamError { error, .. } if error == "decode failed"
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::StreamStopped { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (transport, _servers) = MockTransport::new(vec![Script::Fail]);
        let (channel, _events) = spawn(transport.clone());

        channel.connect().unwrap();
        let mut rx = channel.watch_status();
        rx.wait_for(|s| s.reconnect_pending).await.unwrap();

        channel.disconnect().unwrap();
        let status = *rx
            .wait_for(|s| !s.reconnect_pending && s.state == ChannelState::Disconnected)
            .await
            .unwrap();
        // Counter untouched by a user disconnect
        assert_eq!(status.attempts, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_while_disconnected_is_dropped() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport);

        channel.join_stream(&StreamId::from("s1")).unwrap();
        assert_eq!(channel.status().state, ChannelState::Disconnected);

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;
        wait_state(&channel, ChannelState::Connected).await;

        // The earlier join was not queued: the next frame is the pong
        server.to_client.send("2".to_string()).unwrap();
        assert_eq!(server.from_client.recv().await.unwrap(), "3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespace_connect_error_counts_once() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport);

        channel.connect().unwrap();
        let server = {
            let mut server = servers.recv().await.unwrap();
            server.to_client.send(OPEN.to_string()).unwrap();
            assert_eq!(server.from_client.recv().await.unwrap(), "40/video,");
            server
                .to_client
                .send(r#"44/video,{"message":"Not authorized"}"#.to_string())
                .unwrap();
            server
        };
        // Link close after the error must not count again
        drop(server);

        let mut rx = channel.watch_status();
        let status = *rx.wait_for(|s| s.reconnect_pending).await.unwrap();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.state, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_failures_schedules_one_timer() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport.clone());

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        server.to_client.send(OPEN.to_string()).unwrap();
        assert_eq!(server.from_client.recv().await.unwrap(), "40/video,");
        for frame in [r#"44/video,{"message":"denied"}"#, "41/video,", "1"] {
            server.to_client.send(frame.to_string()).unwrap();
        }
        drop(server);

        let mut rx = channel.watch_status();
        let status = *rx.wait_for(|s| s.reconnect_pending).await.unwrap();
        assert_eq!(status.attempts, 1);

        // Exactly one retry fires after the first delay
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(transport.opens(), 2);
        assert_eq!(channel.status().attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_drop_reconnects_and_resets_counter() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept, Script::Accept]);
        let (channel, _events) = spawn(transport.clone());

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;
        wait_state(&channel, ChannelState::Connected).await;

        drop(server);
        let mut rx = channel.watch_status();
        let status = *rx.wait_for(|s| s.reconnect_pending).await.unwrap();
        assert_eq!(status.attempts, 1);

        let start = Instant::now();
        let mut server = servers.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
        handshake(&mut server).await;

        let status = wait_state(&channel, ChannelState::Connected).await;
        assert_eq!(status.attempts, 0);
        assert_eq!(transport.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_is_a_failed_attempt() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport);

        let start = Instant::now();
        channel.connect().unwrap();
        // Server accepts the socket but never sends the open packet
        let _server = servers.recv().await.unwrap();

        let mut rx = channel.watch_status();
        let status = *rx.wait_for(|s| s.reconnect_pending).await.unwrap();
        assert_eq!(status.attempts, 1);
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_drops_connection() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport);

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;
        wait_state(&channel, ChannelState::Connected).await;

        let start = Instant::now();
        let mut rx = channel.watch_status();
        let status = *rx.wait_for(|s| s.state != ChannelState::Connected).await.unwrap();
        assert_eq!(status.attempts, 1);
        assert!(start.elapsed() >= Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_connected() {
        let (transport, mut servers) = MockTransport::new(vec![Script::Accept]);
        let (channel, _events) = spawn(transport.clone());

        channel.connect().unwrap();
        let mut server = servers.recv().await.unwrap();
        handshake(&mut server).await;
        wait_state(&channel, ChannelState::Connected).await;

        channel.connect().unwrap();
        server.to_client.send("2".to_string()).unwrap();
        assert_eq!(server.from_client.recv().await.unwrap(), "3");
        assert_eq!(transport.opens(), 1);
    }
}
