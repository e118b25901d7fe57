//! Per-connection handler: JOIN, admission, and request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive JOIN → pick the player's name
//!   2. Ask the lobby where the connection belongs
//!   3. While queued: keep reading until paired, leave on close or QUIT
//!   4. Loop: read frames → dispatch to the session
//!
//! Writes never happen on the reading task. Every connection has a writer
//! task fed by an unbounded channel, and the session pushes into that
//! channel after releasing its lock.

use std::sync::Arc;
use std::time::Duration;

use broadside_lobby::{Admission, LobbyError, Waiter, Waiting};
use broadside_protocol::{
    FireCommand, FrameBuffer, Packet, PacketKind, PlaceCommand, ProtocolError, RematchAnswer,
};
use broadside_session::{
    GameError, Participant, ParticipantSender, Phase, Seat, Session, SessionOutbound, SpectatorId,
};
use broadside_transport::{Connection, TcpConnection, TransportError};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::server::ServerState;
use crate::BroadsideError;

/// Name given to a player whose JOIN carried no name.
const DEFAULT_NAME: &str = "Anonymous";

/// Longest accepted player name, in characters. Longer names are cut.
const MAX_NAME_LEN: usize = 32;

/// The seat a queued connection is handed once it has been paired.
type SeatGrant = (Arc<Session>, Seat);

/// A joined connection, as the lobby holds it while it waits for a seat.
///
/// The socket itself stays with the handler task, which keeps reading it
/// and is told its seat through `seated`.
pub(crate) struct Pending {
    outbound: ParticipantSender,
    seated: oneshot::Sender<SeatGrant>,
}

impl Waiter for Pending {
    fn is_gone(&self) -> bool {
        self.outbound.is_closed() || self.seated.is_closed()
    }
}

/// The socket side of a joined connection.
struct Link {
    conn: Arc<TcpConnection>,
    outbound: ParticipantSender,
    frames: FrameBuffer,
}

/// Whether the read loop keeps going after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Leave,
}

/// Handles a single connection from accept to disconnect.
///
/// A queued connection keeps its task: it goes on reading the socket until
/// the lobby pairs it, and leaves the queue if the peer hangs up or quits.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    state: Arc<ServerState>,
) -> Result<(), BroadsideError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let conn = Arc::new(conn);
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    spawn_writer(Arc::clone(&conn), outbound_rx);

    // --- Step 1: JOIN ---
    let mut frames = FrameBuffer::new();
    let (join_seq, name) =
        match read_join(&conn, &mut frames, &outbound, state.config.join_timeout).await {
            Ok(joined) => joined,
            Err(e) => {
                let _ = outbound.send(SessionOutbound::Close);
                return Err(e);
            }
        };
    tracing::info!(%conn_id, %name, "player joined");

    // --- Step 2: Admission ---
    let (seated, seat_rx) = oneshot::channel();
    let pending = Pending {
        outbound: outbound.clone(),
        seated,
    };
    let admission = {
        let mut lobby = state.lobby.lock().await;
        let mut registry = state.registry.lock().await;
        lobby.admit(&name, pending, &mut registry).await
    };
    let link = Link {
        conn,
        outbound,
        frames,
    };

    // --- Step 3: Serve ---
    match admission {
        Ok(Admission::Rejoin { entry, .. }) => {
            let session = entry.session;
            match session
                .rejoin(entry.seat, entry.placement, link.outbound.clone())
                .await
            {
                Ok(()) => run_player(link, session, entry.seat, state).await,
                Err(e) => refuse(&link.outbound, join_seq, e),
            }
        }
        Ok(Admission::Spectate { session, .. }) => {
            match session.attach_spectator(&name, link.outbound.clone()).await {
                Ok(id) => run_spectator(link, session, id).await,
                Err(e) => refuse(&link.outbound, join_seq, e),
            }
        }
        Ok(Admission::Queued { position }) => {
            let text = format!("Waiting for an opponent... (position {position})");
            send(&link.outbound, Packet::new(0, PacketKind::Chat, text));
            wait_for_seat(link, &name, seat_rx, state).await;
        }
        Ok(Admission::Paired { session, players }) => {
            for (seat, Waiting { name, conn }) in Seat::BOTH.into_iter().zip(players) {
                if conn.seated.send((Arc::clone(&session), seat)).is_err() {
                    tracing::warn!(%name, %seat, "paired player left before taking the seat");
                }
            }
            wait_for_seat(link, &name, seat_rx, state).await;
        }
        Err(LobbyError::NameTaken(name)) => {
            tracing::info!(%conn_id, %name, "name already in use");
            refuse(&link.outbound, join_seq, GameError::NameTaken(name));
        }
    }
    Ok(())
}

/// Sends an ERROR frame and closes the connection.
fn refuse(outbound: &ParticipantSender, seq: u8, err: GameError) {
    send(outbound, err.to_packet(seq));
    let _ = outbound.send(SessionOutbound::Close);
}

fn send(outbound: &ParticipantSender, packet: Packet) {
    let _ = outbound.send(SessionOutbound::Packet(packet));
}

/// Waits for the connection's JOIN, answering anything else with an error.
///
/// Returns the JOIN's sequence number and the trimmed player name.
async fn read_join(
    conn: &TcpConnection,
    frames: &mut FrameBuffer,
    outbound: &ParticipantSender,
    timeout: Duration,
) -> Result<(u8, String), BroadsideError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match frames.next_packet() {
            Ok(Some(packet)) if packet.kind == PacketKind::Join => match packet.text() {
                Ok(text) => return Ok((packet.seq, player_name(text))),
                Err(_) => {
                    send(outbound, GameError::BadPayload.to_packet(packet.seq));
                    continue;
                }
            },
            Ok(Some(packet)) => {
                let err = match packet.kind {
                    PacketKind::Error | PacketKind::Unknown(_) => {
                        GameError::UnknownCommand(packet.kind.to_byte())
                    }
                    _ => GameError::WrongPhase(Phase::WaitingForPlayers),
                };
                send(outbound, err.to_packet(packet.seq));
                continue;
            }
            Ok(None) => {}
            Err(ProtocolError::ChecksumMismatch { seq, .. }) => {
                send(outbound, GameError::BadPayload.to_packet(seq));
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        match tokio::time::timeout_at(deadline, conn.recv()).await {
            Ok(Ok(Some(bytes))) => frames.extend(&bytes),
            Ok(Ok(None)) => {
                return Err(TransportError::ConnectionClosed("closed before JOIN".into()).into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                send(outbound, GameError::Timeout.to_packet(0));
                return Err(BroadsideError::JoinTimeout(timeout));
            }
        }
    }
}

/// Trims a JOIN payload into a player name of at most [`MAX_NAME_LEN`]
/// characters.
fn player_name(text: &str) -> String {
    let name: String = text.trim().chars().take(MAX_NAME_LEN).collect();
    match name.trim_end() {
        "" => DEFAULT_NAME.to_string(),
        name => name.to_string(),
    }
}

/// Drains `outbound` onto the socket until it is told to close or every
/// sender is gone.
fn spawn_writer(
    conn: Arc<TcpConnection>,
    mut outbound: mpsc::UnboundedReceiver<SessionOutbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let packet = match message {
                SessionOutbound::Packet(packet) => packet,
                SessionOutbound::Close => break,
            };
            let frame = match packet.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(conn_id = %conn.id(), kind = %packet.kind, error = %e, "dropping unencodable packet");
                    continue;
                }
            };
            if let Err(e) = conn.send(&frame).await {
                tracing::debug!(conn_id = %conn.id(), error = %e, "write failed");
                break;
            }
        }
        let _ = conn.close().await;
        tracing::debug!(conn_id = %conn.id(), "writer finished");
    })
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Keeps reading a queued connection until the lobby hands it a seat.
///
/// Requests that need a match are refused with WRONG_PHASE. A peer that
/// hangs up or sends QUIT is taken out of the queue.
async fn wait_for_seat(
    mut link: Link,
    name: &str,
    mut seat_rx: oneshot::Receiver<SeatGrant>,
    state: Arc<ServerState>,
) {
    loop {
        match seat_rx.try_recv() {
            Ok((session, seat)) => return take_seat(link, session, seat, state).await,
            Err(TryRecvError::Closed) => return,
            Err(TryRecvError::Empty) => {}
        }

        match link.frames.next_packet() {
            Ok(Some(packet)) if packet.kind == PacketKind::Quit => {
                match leave_queue(&state, name, seat_rx).await {
                    Some((session, seat)) => {
                        if session.attach(seat, link.outbound.clone()).await.is_ok() {
                            session.quit(seat, packet.seq).await;
                        }
                    }
                    None => {
                        send(&link.outbound, Packet::new(packet.seq, PacketKind::Quit, "Goodbye"));
                        let _ = link.outbound.send(SessionOutbound::Close);
                    }
                }
                return;
            }
            Ok(Some(packet)) => {
                let err = match packet.kind {
                    PacketKind::Error | PacketKind::Unknown(_) => {
                        GameError::UnknownCommand(packet.kind.to_byte())
                    }
                    _ => GameError::WrongPhase(Phase::WaitingForPlayers),
                };
                send(&link.outbound, err.to_packet(packet.seq));
                continue;
            }
            Ok(None) => {}
            Err(ProtocolError::ChecksumMismatch { seq, .. }) => {
                send(&link.outbound, GameError::BadPayload.to_packet(seq));
                continue;
            }
            Err(e) => {
                tracing::warn!(conn_id = %link.conn.id(), error = %e, "stream desynchronised");
                drop_from_queue(link, name, seat_rx, state).await;
                return;
            }
        }

        let received = tokio::select! {
            granted = &mut seat_rx => match granted {
                Ok((session, seat)) => return take_seat(link, session, seat, state).await,
                Err(_) => return,
            },
            received = link.conn.recv() => received,
        };
        match received {
            Ok(Some(bytes)) => link.frames.extend(&bytes),
            Ok(None) => {
                tracing::info!(conn_id = %link.conn.id(), %name, "peer closed the connection while queued");
                drop_from_queue(link, name, seat_rx, state).await;
                return;
            }
            Err(e) => {
                tracing::info!(conn_id = %link.conn.id(), %name, error = %e, "read failed while queued");
                drop_from_queue(link, name, seat_rx, state).await;
                return;
            }
        }
    }
}

/// Withdraws `name` from the queue. If the lobby paired it first, waits
/// for the seat it was given instead.
async fn leave_queue(
    state: &ServerState,
    name: &str,
    seat_rx: oneshot::Receiver<SeatGrant>,
) -> Option<SeatGrant> {
    if state.lobby.lock().await.withdraw(name).is_some() {
        return None;
    }
    seat_rx.await.ok()
}

/// A queued peer is gone. A seat it was already given is held for
/// reconnection like any other dropped player's.
async fn drop_from_queue(
    link: Link,
    name: &str,
    seat_rx: oneshot::Receiver<SeatGrant>,
    state: Arc<ServerState>,
) {
    if let Some((session, seat)) = leave_queue(&state, name, seat_rx).await {
        if session.attach(seat, link.outbound.clone()).await.is_ok() {
            hold_seat(&state, &session, seat).await;
        }
    }
    let _ = link.outbound.send(SessionOutbound::Close);
}

/// Attaches a paired connection to its seat and serves it.
async fn take_seat(link: Link, session: Arc<Session>, seat: Seat, state: Arc<ServerState>) {
    if let Err(e) = session.attach(seat, link.outbound.clone()).await {
        tracing::warn!(session_id = %session.id(), %seat, error = %e, "could not seat paired player");
        refuse(&link.outbound, 0, e);
        return;
    }
    run_player(link, session, seat, state).await
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

/// One step of a read loop.
enum Read {
    Packet(Packet),
    /// A frame failed its checksum and was skipped.
    Corrupt(u8),
    /// Nothing arrived within the timeout.
    Idle,
    /// A turn began or the phase moved on; the timeout starts over.
    Rearm,
    /// The session ended underneath us.
    SessionOver,
    /// The peer is gone or the stream can no longer be framed.
    Lost,
}

/// Returns the next frame, reading from the socket only when the buffer
/// holds no complete frame.
async fn next_read(
    conn: &TcpConnection,
    frames: &mut FrameBuffer,
    watched: &mut Watched,
    timeout: Option<Duration>,
) -> Read {
    loop {
        match frames.next_packet() {
            Ok(Some(packet)) => return Read::Packet(packet),
            Ok(None) => {}
            Err(ProtocolError::ChecksumMismatch { seq, .. }) => return Read::Corrupt(seq),
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), error = %e, "stream desynchronised");
                return Read::Lost;
            }
        }
        if !watched.phase.borrow_and_update().is_live() {
            return Read::SessionOver;
        }

        let received = tokio::select! {
            changed = watched.phase.changed() => {
                if changed.is_err() || !watched.phase.borrow_and_update().is_live() {
                    return Read::SessionOver;
                }
                return Read::Rearm;
            }
            changed = watched.turn.changed() => {
                if changed.is_err() {
                    return Read::SessionOver;
                }
                watched.turn.borrow_and_update();
                return Read::Rearm;
            }
            received = recv_within(conn, timeout) => received,
        };
        match received {
            Some(Ok(Some(bytes))) => frames.extend(&bytes),
            Some(Ok(None)) => {
                tracing::info!(conn_id = %conn.id(), "peer closed the connection");
                return Read::Lost;
            }
            Some(Err(e)) => {
                tracing::info!(conn_id = %conn.id(), error = %e, "read failed");
                return Read::Lost;
            }
            None => return Read::Idle,
        }
    }
}

/// The session state a read loop reacts to.
struct Watched {
    phase: watch::Receiver<Phase>,
    turn: watch::Receiver<Seat>,
}

impl Watched {
    fn new(session: &Session) -> Self {
        let mut turn = session.subscribe_turn();
        turn.borrow_and_update();
        Self {
            phase: session.subscribe(),
            turn,
        }
    }
}

/// `None` when `timeout` elapsed first.
async fn recv_within(
    conn: &TcpConnection,
    timeout: Option<Duration>,
) -> Option<Result<Option<Vec<u8>>, TransportError>> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, conn.recv()).await.ok(),
        None => Some(conn.recv().await),
    }
}

/// Serves a seated player until they quit, drop, or the match ends.
async fn run_player(link: Link, session: Arc<Session>, seat: Seat, state: Arc<ServerState>) {
    let Link {
        conn,
        outbound,
        mut frames,
    } = link;
    let session_id = session.id();
    let mut watched = Watched::new(&session);
    tracing::debug!(%session_id, %seat, conn_id = %conn.id(), "player loop started");

    loop {
        let timeout = session.read_timeout().await;
        match next_read(&conn, &mut frames, &mut watched, Some(timeout)).await {
            Read::Packet(packet) => {
                if dispatch_player(&session, seat, &outbound, packet).await == Flow::Leave {
                    break;
                }
            }
            Read::Corrupt(seq) => send(&outbound, GameError::BadPayload.to_packet(seq)),
            Read::Idle => on_idle(&session, seat).await,
            Read::Rearm => {}
            Read::SessionOver => break,
            Read::Lost => {
                hold_seat(&state, &session, seat).await;
                break;
            }
        }
    }
    tracing::debug!(%session_id, %seat, "player loop finished");
}

/// Nothing arrived within the read timeout.
async fn on_idle(session: &Session, seat: Seat) {
    match session.phase() {
        Phase::InProgress => {
            if session.forfeit_turn(seat).await {
                tracing::info!(session_id = %session.id(), %seat, "turn forfeited after inactivity");
            }
        }
        Phase::GameOver => {
            session.expire_rematch().await;
        }
        _ => {}
    }
}

/// Vacates a dropped player's seat and files it for reconnection.
async fn hold_seat(state: &ServerState, session: &Arc<Session>, seat: Seat) {
    if let Some(entry) = session.vacate(seat).await {
        let name = session.player_name(seat).to_string();
        state.registry.lock().await.insert(name, entry);
    }
}

async fn dispatch_player(
    session: &Session,
    seat: Seat,
    outbound: &ParticipantSender,
    packet: Packet,
) -> Flow {
    let seq = packet.seq;
    tracing::debug!(session_id = %session.id(), %seat, kind = %packet.kind, seq, "request");

    let result = match packet.kind {
        PacketKind::Join => Err(GameError::WrongPhase(session.phase())),
        PacketKind::Place => handle_place(session, seat, &packet).await,
        PacketKind::Fire => handle_fire(session, seat, &packet).await,
        PacketKind::Show => {
            session.render_board(seat, seq).await;
            Ok(())
        }
        PacketKind::Chat => match text_of(&packet) {
            Ok(text) => session.chat(Participant::Player(seat), text).await,
            Err(e) => Err(e),
        },
        PacketKind::Rematch => handle_rematch(session, seat, &packet).await,
        PacketKind::Quit => {
            session.quit(seat, seq).await;
            return Flow::Leave;
        }
        PacketKind::Error | PacketKind::Unknown(_) => {
            Err(GameError::UnknownCommand(packet.kind.to_byte()))
        }
    };

    if let Err(e) = result {
        tracing::debug!(session_id = %session.id(), %seat, code = e.code(), error = %e, "request refused");
        send(outbound, e.to_packet(seq));
    }
    Flow::Continue
}

fn text_of(packet: &Packet) -> Result<&str, GameError> {
    packet.text().map_err(|_| GameError::BadPayload)
}

async fn handle_place(session: &Session, seat: Seat, packet: &Packet) -> Result<(), GameError> {
    match PlaceCommand::parse(text_of(packet)?)? {
        PlaceCommand::Ship {
            origin,
            orientation,
            ship,
        } => {
            session
                .place(seat, packet.seq, origin, orientation, &ship)
                .await?;
        }
        PlaceCommand::Auto => {
            session.place_remaining(seat, packet.seq).await?;
        }
    }
    Ok(())
}

async fn handle_fire(session: &Session, seat: Seat, packet: &Packet) -> Result<(), GameError> {
    let FireCommand { target } = FireCommand::parse(text_of(packet)?)?;
    let outcome = session.fire(seat, packet.seq, target).await?;
    if outcome.game_over {
        tracing::info!(session_id = %session.id(), winner = %seat, "fleet sunk");
    }
    Ok(())
}

async fn handle_rematch(session: &Session, seat: Seat, packet: &Packet) -> Result<(), GameError> {
    let answer = RematchAnswer::parse(text_of(packet)?)?;
    session.answer_rematch(seat, packet.seq, answer).await
}

// ---------------------------------------------------------------------------
// Spectators
// ---------------------------------------------------------------------------

/// Serves a spectator. They may chat or leave; anything else is refused.
async fn run_spectator(link: Link, session: Arc<Session>, id: SpectatorId) {
    let Link {
        conn,
        outbound,
        mut frames,
    } = link;
    let mut watched = Watched::new(&session);

    loop {
        match next_read(&conn, &mut frames, &mut watched, None).await {
            Read::Packet(packet) => {
                let seq = packet.seq;
                let result = match packet.kind {
                    PacketKind::Chat => match text_of(&packet) {
                        Ok(text) => session.chat(Participant::Spectator(id), text).await,
                        Err(e) => Err(e),
                    },
                    PacketKind::Quit => {
                        send(&outbound, Packet::new(seq, PacketKind::Quit, "Goodbye"));
                        let _ = outbound.send(SessionOutbound::Close);
                        break;
                    }
                    PacketKind::Join => Err(GameError::WrongPhase(session.phase())),
                    PacketKind::Error | PacketKind::Unknown(_) => {
                        Err(GameError::UnknownCommand(packet.kind.to_byte()))
                    }
                    _ => Err(GameError::NotAPlayer),
                };
                if let Err(e) = result {
                    send(&outbound, e.to_packet(seq));
                }
            }
            Read::Corrupt(seq) => send(&outbound, GameError::BadPayload.to_packet(seq)),
            Read::Idle | Read::Rearm => {}
            Read::SessionOver | Read::Lost => break,
        }
    }
    session.detach_spectator(id).await;
    tracing::debug!(session_id = %session.id(), spectator = ?id, "spectator left");
}
