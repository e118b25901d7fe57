//! A single match: two seats, their fleets, spectators, and the turn.
//!
//! Every connection handler bound to a match holds an `Arc<Session>` and
//! calls its methods. All match state sits behind one `tokio::sync::Mutex`,
//! so two handlers can never interleave inside a turn.
//!
//! # Outbound delivery
//!
//! Methods never write to sockets. Each participant registers an unbounded
//! channel ([`ParticipantSender`]) and a writer task on the other end
//! drains it to the socket. Under the lock a method only decides who gets
//! what, collecting `(sender, message)` pairs in an outbox; the pairs are
//! pushed into the channels after the guard is dropped. A slow reader
//! therefore never holds up the match.
//!
//! # Phase changes
//!
//! The current [`Phase`] is mirrored into a `watch` channel. Handlers
//! [`subscribe`](Session::subscribe) to it so they can stop reading as soon
//! as the match is terminated, whoever terminated it. The seat to move is
//! mirrored the same way ([`subscribe_turn`](Session::subscribe_turn)), so
//! an inactivity deadline can restart when a turn begins.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use broadside_board::{Coord, Orientation, Placement, ShotResult, FLEET};
use broadside_protocol::{chunk_payload, Packet, PacketKind, RematchAnswer};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info};

use crate::{GameError, Phase, ReconnectEntry, SessionConfig};

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique ID of a match, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One of the two player seats. The first seat moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    pub const BOTH: [Seat; 2] = [Seat::First, Seat::Second];

    /// Index into per-seat arrays.
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.index() + 1)
    }
}

/// Handle for a spectator attached to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpectatorId(u64);

/// Anyone bound to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Player(Seat),
    Spectator(SpectatorId),
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// What a connection's writer task is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutbound {
    /// Encode and write this packet.
    Packet(Packet),
    /// Flush what came before, then close the connection.
    Close,
}

/// Channel sender for delivering outbound messages to one participant.
pub type ParticipantSender = mpsc::UnboundedSender<SessionOutbound>;

/// Who a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Seat(Seat),
    Players,
    Spectators,
    Everyone,
}

/// What a FIRE did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireOutcome {
    pub result: ShotResult,
    pub sunk: Option<&'static str>,
    pub game_over: bool,
}

/// Messages resolved under the lock, sent after it is released.
#[derive(Default)]
struct Outbox {
    deliveries: Vec<(ParticipantSender, SessionOutbound)>,
}

impl Outbox {
    fn push(&mut self, to: &ParticipantSender, message: SessionOutbound) {
        self.deliveries.push((to.clone(), message));
    }

    fn deliver(self) {
        for (to, message) in self.deliveries {
            // A closed channel means the writer is gone; the handler will
            // notice the dead socket on its own.
            let _ = to.send(message);
        }
    }
}

/// Server notice: a CHAT frame with seq 0.
fn notice(text: impl Into<String>) -> Packet {
    Packet::fitted(0, PacketKind::Chat, text)
}

fn placement_prompt() -> String {
    let roster: Vec<String> = FLEET
        .iter()
        .map(|ship| format!("{}({})", ship.name(), ship.length()))
        .collect();
    format!(
        "PLACEMENT Place your fleet: {}. Send PLACE <coord> <H|V> <ship> or PLACE AUTO.",
        roster.join(" ")
    )
}

// ---------------------------------------------------------------------------
// MatchState
// ---------------------------------------------------------------------------

struct SeatState {
    name: String,
    /// `None` while the seat is vacant.
    outbound: Option<ParticipantSender>,
    placement: Placement,
}

struct Spectator {
    id: SpectatorId,
    name: String,
    outbound: ParticipantSender,
}

/// Everything guarded by the session lock.
struct MatchState {
    id: SessionId,
    phase: Phase,
    phase_tx: watch::Sender<Phase>,
    turn: Seat,
    turn_tx: watch::Sender<Seat>,
    seats: [SeatState; 2],
    spectators: Vec<Spectator>,
    next_spectator: u64,
    rematch_votes: [bool; 2],
    rematch_deadline: Option<Instant>,
}

impl MatchState {
    fn name(&self, seat: Seat) -> &str {
        &self.seats[seat.index()].name
    }

    fn is_connected(&self, seat: Seat) -> bool {
        self.seats[seat.index()].outbound.is_some()
    }

    fn recipients(&self, to: Recipient) -> Vec<&ParticipantSender> {
        let player = move |seat: Seat| self.seats[seat.index()].outbound.as_ref();
        match to {
            Recipient::Seat(seat) => player(seat).into_iter().collect(),
            Recipient::Players => Seat::BOTH.into_iter().filter_map(player).collect(),
            Recipient::Spectators => self.spectators.iter().map(|s| &s.outbound).collect(),
            Recipient::Everyone => {
                let mut all = self.recipients(Recipient::Players);
                all.extend(self.recipients(Recipient::Spectators));
                all
            }
        }
    }

    fn send(&self, out: &mut Outbox, to: Recipient, packet: Packet) {
        for sender in self.recipients(to) {
            out.push(sender, SessionOutbound::Packet(packet.clone()));
        }
    }

    fn require_phase(&self, phase: Phase) -> Result<(), GameError> {
        if self.phase == phase {
            Ok(())
        } else if !self.phase.is_live() {
            Err(GameError::SessionOver)
        } else {
            Err(GameError::WrongPhase(self.phase))
        }
    }

    fn set_phase(&mut self, next: Phase) {
        debug_assert!(self.phase.can_transition_to(next), "{} -> {}", self.phase, next);
        info!(session_id = %self.id, from = %self.phase, to = %next, "phase changed");
        self.phase = next;
        self.phase_tx.send_replace(next);
    }

    /// Hands the turn to `seat`. Subscribers wake even when the seat is
    /// unchanged, since a new turn has still begun.
    fn set_turn(&mut self, seat: Seat) {
        self.turn = seat;
        self.turn_tx.send_replace(seat);
    }

    /// Moves to IN_PROGRESS with the first seat to fire.
    fn start_game(&mut self, out: &mut Outbox, headline: &str) {
        self.set_phase(Phase::InProgress);
        self.set_turn(Seat::First);
        let text = format!("{headline} {} fires first", self.name(Seat::First));
        self.send(out, Recipient::Everyone, notice(text));
    }

    fn after_placement(&mut self, seat: Seat, out: &mut Outbox) {
        if !self.seats[seat.index()].placement.is_complete() {
            return;
        }
        if self.seats.iter().all(|s| s.placement.is_complete()) {
            self.start_game(out, "GAME START");
        } else {
            self.send(
                out,
                Recipient::Seat(seat),
                notice("Fleet ready. Waiting for your opponent."),
            );
            let text = format!("{} is ready.", self.name(seat));
            self.send(out, Recipient::Seat(seat.opponent()), notice(text));
        }
    }

    fn finish_game(&mut self, winner: Seat, window: Duration, out: &mut Outbox) {
        self.set_phase(Phase::GameOver);
        self.rematch_votes = [false; 2];
        self.rematch_deadline = Some(Instant::now() + window);

        let text = format!("GAME OVER {} wins", self.name(winner));
        self.send(out, Recipient::Everyone, notice(text));
        let prompt = format!(
            "Play again? Send REMATCH YES or NO within {}s",
            window.as_secs()
        );
        self.send(out, Recipient::Players, Packet::fitted(0, PacketKind::Rematch, prompt));
    }

    fn rematch_expired(&self) -> bool {
        self.rematch_deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Ends the match: every writer is told to close, and the seats and
    /// spectator list let go of their senders.
    fn terminate(&mut self, out: &mut Outbox) {
        self.set_phase(Phase::Terminated);
        for sender in self.recipients(Recipient::Everyone) {
            out.push(sender, SessionOutbound::Close);
        }
        for seat in &mut self.seats {
            seat.outbound = None;
        }
        self.spectators.clear();
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A match between two named players.
///
/// Created by the lobby in WAITING_FOR_PLAYERS. Moves to PLACEMENT once
/// both seats are [attached](Session::attach).
pub struct Session {
    id: SessionId,
    names: [String; 2],
    config: SessionConfig,
    state: Mutex<MatchState>,
    phase_rx: watch::Receiver<Phase>,
    turn_rx: watch::Receiver<Seat>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("names", &self.names)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Session {
    pub fn new(config: SessionConfig, names: [String; 2]) -> Arc<Self> {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        let (phase_tx, phase_rx) = watch::channel(Phase::WaitingForPlayers);
        let (turn_tx, turn_rx) = watch::channel(Seat::First);
        let seat = |name: &String| SeatState {
            name: name.clone(),
            outbound: None,
            placement: Placement::new(),
        };

        let state = MatchState {
            id,
            phase: Phase::WaitingForPlayers,
            phase_tx,
            turn: Seat::First,
            turn_tx,
            seats: [seat(&names[0]), seat(&names[1])],
            spectators: Vec::new(),
            next_spectator: 1,
            rematch_votes: [false; 2],
            rematch_deadline: None,
        };

        info!(session_id = %id, first = %names[0], second = %names[1], "session created");
        Arc::new(Self {
            id,
            names,
            config,
            state: Mutex::new(state),
            phase_rx,
            turn_rx,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn player_name(&self, seat: Seat) -> &str {
        &self.names[seat.index()]
    }

    /// The seat held by `name`, if either player has that name.
    pub fn seat_of(&self, name: &str) -> Option<Seat> {
        Seat::BOTH
            .into_iter()
            .find(|seat| self.names[seat.index()] == name)
    }

    /// Current phase, without taking the lock.
    pub fn phase(&self) -> Phase {
        *self.phase_rx.borrow()
    }

    /// A receiver that wakes on every phase change.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase_rx.clone()
    }

    /// A receiver that wakes whenever a turn begins.
    pub fn subscribe_turn(&self) -> watch::Receiver<Seat> {
        self.turn_rx.clone()
    }

    /// Runs `f` under the lock, then delivers whatever it queued.
    async fn with_state<R>(&self, f: impl FnOnce(&mut MatchState, &mut Outbox) -> R) -> R {
        let mut out = Outbox::default();
        let result = {
            let mut state = self.state.lock().await;
            f(&mut state, &mut out)
        };
        out.deliver();
        result
    }

    // -- Seating ----------------------------------------------------------

    /// Connects a player's outbound channel to their seat and tells them
    /// which player they are. Once both seats are attached, placement
    /// begins.
    pub async fn attach(&self, seat: Seat, outbound: ParticipantSender) -> Result<(), GameError> {
        self.with_state(|state, out| {
            if !state.phase.is_live() {
                return Err(GameError::SessionOver);
            }
            if state.is_connected(seat) {
                return Err(GameError::SessionFull);
            }
            state.seats[seat.index()].outbound = Some(outbound);
            let text = format!("You are {seat} ({})", state.name(seat));
            state.send(out, Recipient::Seat(seat), notice(text));

            if state.phase == Phase::WaitingForPlayers
                && Seat::BOTH.into_iter().all(|s| state.is_connected(s))
            {
                state.set_phase(Phase::Placement);
                state.send(out, Recipient::Players, notice(placement_prompt()));
            }
            Ok(())
        })
        .await
    }

    /// Adds a spectator, if the match is live and has room.
    pub async fn attach_spectator(
        &self,
        name: &str,
        outbound: ParticipantSender,
    ) -> Result<SpectatorId, GameError> {
        let max = self.config.max_spectators;
        let result = self
            .with_state(|state, out| {
                if !state.phase.is_live() {
                    return Err(GameError::SessionOver);
                }
                state.spectators.retain(|s| !s.outbound.is_closed());
                if state.spectators.len() >= max {
                    return Err(GameError::SessionFull);
                }

                let id = SpectatorId(state.next_spectator);
                state.next_spectator += 1;
                let welcome = format!(
                    "You are spectating {} vs {} ({})",
                    state.name(Seat::First),
                    state.name(Seat::Second),
                    state.phase
                );
                out.push(&outbound, SessionOutbound::Packet(notice(welcome)));
                state.send(
                    out,
                    Recipient::Players,
                    notice(format!("{name} is spectating")),
                );
                state.spectators.push(Spectator {
                    id,
                    name: name.to_string(),
                    outbound,
                });
                Ok(id)
            })
            .await;

        if let Ok(id) = &result {
            info!(session_id = %self.id, spectator = ?id, name, "spectator attached");
        }
        result
    }

    /// Removes a spectator. Unknown ids are ignored.
    pub async fn detach_spectator(&self, id: SpectatorId) {
        self.with_state(|state, _| state.spectators.retain(|s| s.id != id))
            .await;
    }

    /// `true` if another spectator would be accepted right now.
    pub async fn has_spectator_capacity(&self) -> bool {
        let state = self.state.lock().await;
        state.phase.is_live()
            && state
                .spectators
                .iter()
                .filter(|s| !s.outbound.is_closed())
                .count()
                < self.config.max_spectators
    }

    // -- Placement --------------------------------------------------------

    /// Places one named ship for `seat`. Returns its canonical name.
    pub async fn place(
        &self,
        seat: Seat,
        seq: u8,
        origin: Coord,
        orientation: Orientation,
        ship: &str,
    ) -> Result<&'static str, GameError> {
        self.with_state(|state, out| {
            state.require_phase(Phase::Placement)?;
            let name = state.seats[seat.index()]
                .placement
                .place(ship, origin, orientation)?;
            debug!(session_id = %state.id, %seat, ship = name, %origin, "ship placed");

            let ack = format!("PLACED {name} {origin} {orientation}");
            state.send(out, Recipient::Seat(seat), Packet::fitted(seq, PacketKind::Place, ack));
            state.after_placement(seat, out);
            Ok(name)
        })
        .await
    }

    /// Places every ship `seat` has not placed yet at random.
    pub async fn place_remaining(&self, seat: Seat, seq: u8) -> Result<Vec<&'static str>, GameError> {
        self.with_state(|state, out| {
            state.require_phase(Phase::Placement)?;
            let placement = &mut state.seats[seat.index()].placement;
            if placement.is_complete() {
                return Err(GameError::AlreadyPlaced("the whole fleet".into()));
            }
            let placed = placement.place_remaining(&mut rand::rng())?;
            debug!(session_id = %state.id, %seat, ?placed, "ships placed at random");

            let ack = format!("PLACED {}", placed.join(", "));
            state.send(out, Recipient::Seat(seat), Packet::fitted(seq, PacketKind::Place, ack));
            state.after_placement(seat, out);
            Ok(placed)
        })
        .await
    }

    // -- Play -------------------------------------------------------------

    /// Fires at the opponent's board.
    ///
    /// The turn passes to the opponent on a miss or a hit that does not end
    /// the game. Firing at an already resolved cell changes nothing, the
    /// turn included.
    pub async fn fire(&self, seat: Seat, seq: u8, target: Coord) -> Result<FireOutcome, GameError> {
        let window = self.config.rematch_window;
        self.with_state(|state, out| {
            state.require_phase(Phase::InProgress)?;
            if state.turn != seat {
                return Err(GameError::NotYourTurn);
            }
            let opponent = seat.opponent();
            if !state.is_connected(opponent) {
                return Err(GameError::OpponentAway);
            }

            let (result, sunk) = state.seats[opponent.index()]
                .placement
                .board_mut()
                .fire_at(target);
            let suffix = sunk.map(|name| format!(" SUNK {name}")).unwrap_or_default();
            let verdict = format!("{}{suffix}", result.as_str());
            debug!(session_id = %state.id, %seat, %target, %verdict, "shot fired");

            state.send(
                out,
                Recipient::Seat(seat),
                Packet::fitted(seq, PacketKind::Fire, format!("RESULT {verdict}")),
            );
            if result == ShotResult::AlreadyShot {
                return Ok(FireOutcome { result, sunk, game_over: false });
            }

            state.send(
                out,
                Recipient::Seat(opponent),
                Packet::fitted(0, PacketKind::Fire, format!("INCOMING {target} {verdict}")),
            );
            let report = format!("{} FIRE {target} {verdict}", state.name(seat));
            state.send(out, Recipient::Spectators, Packet::fitted(0, PacketKind::Fire, report));

            let game_over = state.seats[opponent.index()].placement.board().all_ships_sunk();
            if game_over {
                state.finish_game(seat, window, out);
            } else {
                state.set_turn(opponent);
                let text = format!("TURN {}", state.name(opponent));
                state.send(out, Recipient::Everyone, notice(text));
            }
            Ok(FireOutcome { result, sunk, game_over })
        })
        .await
    }

    /// Passes the turn on if `seat` holds it in IN_PROGRESS. Returns whether
    /// the turn moved.
    pub async fn forfeit_turn(&self, seat: Seat) -> bool {
        self.with_state(|state, out| {
            if state.phase != Phase::InProgress || state.turn != seat {
                return false;
            }
            let opponent = seat.opponent();
            state.set_turn(opponent);
            info!(session_id = %state.id, %seat, "turn forfeited on inactivity");

            state.send(out, Recipient::Seat(seat), notice("Timeout. You forfeit your turn."));
            let name = state.name(seat).to_string();
            state.send(
                out,
                Recipient::Seat(opponent),
                notice(format!("{name} timed out. Your turn.")),
            );
            state.send(out, Recipient::Spectators, notice(format!("{name} timed out.")));
            true
        })
        .await
    }

    /// Sends `seat` the rendering of their own board, chunked if needed.
    pub async fn render_board(&self, seat: Seat, seq: u8) {
        self.with_state(|state, out| {
            let text = state.seats[seat.index()].placement.board().render();
            for chunk in chunk_payload(text.as_bytes()) {
                state.send(out, Recipient::Seat(seat), Packet::new(seq, PacketKind::Show, chunk));
            }
        })
        .await
    }

    /// Broadcasts `[name]: text` to everyone in the match.
    pub async fn chat(&self, from: Participant, text: &str) -> Result<(), GameError> {
        self.with_state(|state, out| {
            let name = match from {
                Participant::Player(seat) => state.name(seat).to_string(),
                Participant::Spectator(id) => state
                    .spectators
                    .iter()
                    .find(|s| s.id == id)
                    .map(|s| s.name.clone())
                    .ok_or(GameError::SessionOver)?,
            };
            state.send(out, Recipient::Everyone, notice(format!("[{name}]: {text}")));
            Ok(())
        })
        .await
    }

    // -- Game over --------------------------------------------------------

    /// Records a rematch answer.
    ///
    /// Two YES answers redeploy both fleets at random and start a new game.
    /// A NO ends the match. An answer after the window has closed ends the
    /// match and is refused with TIMEOUT.
    pub async fn answer_rematch(
        &self,
        seat: Seat,
        seq: u8,
        answer: RematchAnswer,
    ) -> Result<(), GameError> {
        self.with_state(|state, out| {
            state.require_phase(Phase::GameOver)?;
            if state.rematch_expired() {
                close_rematch(state, out);
                return Err(GameError::Timeout);
            }

            let name = state.name(seat).to_string();
            match answer {
                RematchAnswer::No => {
                    let text = format!("{name} declined a rematch. Session over.");
                    state.send(out, Recipient::Everyone, Packet::fitted(0, PacketKind::Quit, text));
                    state.terminate(out);
                }
                RematchAnswer::Yes => {
                    state.rematch_votes[seat.index()] = true;
                    if state.rematch_votes.iter().all(|vote| *vote) {
                        let mut rng = rand::rng();
                        for slot in &mut state.seats {
                            slot.placement.reset();
                            slot.placement.place_remaining(&mut rng)?;
                        }
                        state.rematch_deadline = None;
                        state.start_game(out, "REMATCH Fleets redeployed at random.");
                    } else {
                        let opponent = seat.opponent();
                        let waiting = format!("WAITING for {}", state.name(opponent));
                        state.send(
                            out,
                            Recipient::Seat(seat),
                            Packet::fitted(seq, PacketKind::Rematch, waiting),
                        );
                        state.send(
                            out,
                            Recipient::Seat(opponent),
                            Packet::fitted(0, PacketKind::Rematch, format!("{name} wants a rematch")),
                        );
                    }
                }
            }
            Ok(())
        })
        .await
    }

    /// Terminates the match if it is in GAME_OVER and the rematch window
    /// has closed. Returns whether it did.
    pub async fn expire_rematch(&self) -> bool {
        self.with_state(|state, out| {
            if state.phase != Phase::GameOver || !state.rematch_expired() {
                return false;
            }
            close_rematch(state, out);
            true
        })
        .await
    }

    /// How long the next read on a player socket may wait: the inactivity
    /// timeout, or what is left of the rematch window during GAME_OVER.
    pub async fn read_timeout(&self) -> Duration {
        let state = self.state.lock().await;
        match (state.phase, state.rematch_deadline) {
            (Phase::GameOver, Some(deadline)) => deadline.saturating_duration_since(Instant::now()),
            _ => self.config.inactivity_timeout,
        }
    }

    // -- Leaving ----------------------------------------------------------

    /// `seat` leaves on purpose. The opponent wins by forfeit and the match
    /// is terminated.
    pub async fn quit(&self, seat: Seat, seq: u8) {
        self.with_state(|state, out| {
            if !state.phase.is_live() {
                return;
            }
            let name = state.name(seat).to_string();
            let opponent = state.name(seat.opponent()).to_string();
            info!(session_id = %state.id, %seat, %name, "player quit");

            state.send(out, Recipient::Seat(seat), Packet::fitted(seq, PacketKind::Quit, "Goodbye"));
            state.send(
                out,
                Recipient::Seat(seat.opponent()),
                Packet::fitted(0, PacketKind::Quit, format!("{name} quit. You win!")),
            );
            state.send(
                out,
                Recipient::Spectators,
                Packet::fitted(0, PacketKind::Quit, format!("{name} quit. {opponent} wins.")),
            );
            state.terminate(out);
        })
        .await
    }

    /// `seat`'s connection failed. Frees the seat and returns what the
    /// reconnection registry needs to put the player back later.
    ///
    /// Returns `None` if the match is already over or the seat was already
    /// vacant.
    pub async fn vacate(self: &Arc<Self>, seat: Seat) -> Option<ReconnectEntry> {
        let snapshot = self
            .with_state(|state, out| {
                if !state.phase.is_live() || !state.is_connected(seat) {
                    return None;
                }
                state.seats[seat.index()].outbound = None;
                info!(session_id = %state.id, %seat, "seat vacated, awaiting reconnection");

                let text = format!("{} disconnected. Waiting for them to reconnect.", state.name(seat));
                state.send(out, Recipient::Seat(seat.opponent()), notice(text.clone()));
                state.send(out, Recipient::Spectators, notice(text));
                Some(state.seats[seat.index()].placement.clone())
            })
            .await?;

        Some(ReconnectEntry {
            disconnected_at: Instant::now(),
            seat,
            opponent_seat: seat.opponent(),
            placement: snapshot,
            session: Arc::clone(self),
        })
    }

    /// Puts a returning player back in their seat with their saved fleet.
    pub async fn rejoin(
        &self,
        seat: Seat,
        placement: Placement,
        outbound: ParticipantSender,
    ) -> Result<(), GameError> {
        self.with_state(|state, out| {
            if !state.phase.is_live() {
                return Err(GameError::SessionOver);
            }
            if state.is_connected(seat) {
                return Err(GameError::NameTaken(state.name(seat).to_string()));
            }
            let slot = &mut state.seats[seat.index()];
            slot.placement = placement;
            slot.outbound = Some(outbound);
            info!(session_id = %state.id, %seat, "player rejoined");

            let name = state.name(seat).to_string();
            let status = match state.phase {
                Phase::InProgress => format!(" TURN {}", state.name(state.turn)),
                _ => String::new(),
            };
            let welcome = format!("Welcome back, {name}. You are {seat}. {}{status}", state.phase);
            state.send(out, Recipient::Seat(seat), notice(welcome));

            let text = format!("{name} reconnected.");
            state.send(out, Recipient::Seat(seat.opponent()), notice(text.clone()));
            state.send(out, Recipient::Spectators, notice(text));
            Ok(())
        })
        .await
    }

    /// `seat` never came back. The opponent wins by forfeit and the match
    /// is terminated. Does nothing if the player has rejoined meanwhile.
    pub async fn abandon(&self, seat: Seat) -> bool {
        self.with_state(|state, out| {
            if !state.phase.is_live() || state.is_connected(seat) {
                return false;
            }
            let name = state.name(seat).to_string();
            let opponent = state.name(seat.opponent()).to_string();
            info!(session_id = %state.id, %seat, %name, "seat abandoned");

            state.send(
                out,
                Recipient::Seat(seat.opponent()),
                Packet::fitted(0, PacketKind::Quit, format!("{name} did not reconnect. You win!")),
            );
            state.send(
                out,
                Recipient::Spectators,
                Packet::fitted(0, PacketKind::Quit, format!("{name} did not reconnect. {opponent} wins.")),
            );
            state.terminate(out);
            true
        })
        .await
    }

    // -- Inspection -------------------------------------------------------

    /// Whose turn it is.
    pub async fn turn(&self) -> Seat {
        self.state.lock().await.turn
    }

    /// A copy of `seat`'s fleet and board.
    pub async fn placement(&self, seat: Seat) -> Placement {
        self.state.lock().await.seats[seat.index()].placement.clone()
    }

    /// `false` while the seat is vacant.
    pub async fn is_connected(&self, seat: Seat) -> bool {
        self.state.lock().await.is_connected(seat)
    }

    pub async fn spectator_count(&self) -> usize {
        self.state.lock().await.spectators.len()
    }
}

fn close_rematch(state: &mut MatchState, out: &mut Outbox) {
    info!(session_id = %state.id, "rematch window closed");
    state.send(
        out,
        Recipient::Everyone,
        Packet::fitted(0, PacketKind::Quit, "Rematch window closed. Session over."),
    );
    state.terminate(out);
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    type Inbox = UnboundedReceiver<SessionOutbound>;

    fn at(text: &str) -> Coord {
        Coord::parse(text).unwrap()
    }

    /// A session with both seats attached, in PLACEMENT.
    async fn seated() -> (Arc<Session>, Inbox, Inbox) {
        let session = Session::new(
            SessionConfig::default(),
            ["Alice".to_string(), "Bob".to_string()],
        );
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        session.attach(Seat::First, a_tx).await.unwrap();
        session.attach(Seat::Second, b_tx).await.unwrap();
        (session, a_rx, b_rx)
    }

    /// Lays every ship out horizontally, one per row from A.
    async fn place_fleet(session: &Session, seat: Seat) {
        for (row, ship) in FLEET.iter().enumerate() {
            let origin = Coord::new(row, 0).unwrap();
            session
                .place(seat, 1, origin, Orientation::Horizontal, ship.name())
                .await
                .unwrap();
        }
    }

    async fn in_progress() -> (Arc<Session>, Inbox, Inbox) {
        let (session, a, b) = seated().await;
        place_fleet(&session, Seat::First).await;
        place_fleet(&session, Seat::Second).await;
        (session, a, b)
    }

    fn drain_texts(inbox: &mut Inbox) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(message) = inbox.try_recv() {
            if let SessionOutbound::Packet(packet) = message {
                texts.push(packet.text().unwrap().to_string());
            }
        }
        texts
    }

    // =====================================================================
    // attach()
    // =====================================================================

    #[tokio::test]
    async fn test_attach_both_seats_enters_placement() {
        let (session, mut a, _b) = seated().await;
        assert_eq!(session.phase(), Phase::Placement);

        let texts = drain_texts(&mut a);
        assert_eq!(texts[0], "You are Player 1 (Alice)");
        assert!(texts[1].starts_with("PLACEMENT"));
    }

    #[tokio::test]
    async fn test_attach_occupied_seat_is_rejected() {
        let (session, _a, _b) = seated().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(
            session.attach(Seat::First, tx).await,
            Err(GameError::SessionFull)
        );
    }

    // =====================================================================
    // place() / place_remaining()
    // =====================================================================

    #[tokio::test]
    async fn test_place_completing_both_fleets_starts_game() {
        let (session, _a, _b) = in_progress().await;
        assert_eq!(session.phase(), Phase::InProgress);
        assert_eq!(session.turn().await, Seat::First);
    }

    #[tokio::test]
    async fn test_place_outside_placement_is_wrong_phase() {
        let (session, _a, _b) = in_progress().await;
        let err = session
            .place(Seat::First, 3, at("J1"), Orientation::Horizontal, "Carrier")
            .await
            .unwrap_err();
        assert_eq!(err, GameError::WrongPhase(Phase::InProgress));
    }

    #[tokio::test]
    async fn test_place_remaining_completes_fleet() {
        let (session, _a, _b) = seated().await;
        session
            .place(Seat::First, 1, at("A1"), Orientation::Horizontal, "Carrier")
            .await
            .unwrap();

        let placed = session.place_remaining(Seat::First, 2).await.unwrap();
        assert_eq!(placed.len(), FLEET.len() - 1);
        assert!(session.placement(Seat::First).await.is_complete());
        assert_eq!(session.phase(), Phase::Placement);

        assert_eq!(
            session.place_remaining(Seat::First, 3).await,
            Err(GameError::AlreadyPlaced("the whole fleet".into()))
        );
    }

    // =====================================================================
    // fire()
    // =====================================================================

    #[tokio::test]
    async fn test_fire_out_of_turn_leaves_turn_unchanged() {
        let (session, _a, mut b) = in_progress().await;
        drain_texts(&mut b);

        let err = session.fire(Seat::Second, 9, at("A1")).await.unwrap_err();

        assert_eq!(err, GameError::NotYourTurn);
        assert_eq!(session.turn().await, Seat::First);
        assert!(drain_texts(&mut b).is_empty());
    }

    #[tokio::test]
    async fn test_fire_miss_toggles_turn_and_notifies_opponent() {
        let (session, mut a, mut b) = in_progress().await;
        drain_texts(&mut a);
        drain_texts(&mut b);

        let outcome = session.fire(Seat::First, 4, at("J10")).await.unwrap();

        assert_eq!(outcome.result, ShotResult::Miss);
        assert_eq!(session.turn().await, Seat::Second);
        assert!(drain_texts(&mut a).contains(&"RESULT MISS".to_string()));
        assert!(drain_texts(&mut b).contains(&"INCOMING J10 MISS".to_string()));
    }

    #[tokio::test]
    async fn test_fire_already_shot_keeps_turn() {
        let (session, _a, _b) = in_progress().await;
        session.fire(Seat::First, 1, at("J10")).await.unwrap();
        session.fire(Seat::Second, 2, at("J10")).await.unwrap();

        let outcome = session.fire(Seat::First, 3, at("J10")).await.unwrap();
        assert_eq!(outcome.result, ShotResult::AlreadyShot);
        assert_eq!(session.turn().await, Seat::First);
    }

    #[tokio::test]
    async fn test_fire_at_vacant_opponent_is_rejected() {
        let (session, _a, _b) = in_progress().await;
        let entry = session.vacate(Seat::Second).await.unwrap();
        assert_eq!(entry.opponent_seat, Seat::First);

        assert_eq!(
            session.fire(Seat::First, 5, at("A1")).await,
            Err(GameError::OpponentAway)
        );
    }

    #[tokio::test]
    async fn test_fire_sinking_last_ship_ends_game() {
        let (session, mut a, _b) = in_progress().await;
        let targets: Vec<Coord> = session
            .placement(Seat::Second)
            .await
            .board()
            .ships()
            .iter()
            .flat_map(|ship| ship.remaining().iter().copied().collect::<Vec<_>>())
            .collect();
        // Bob answers every hit with a miss on rows F-J, which are empty.
        let mut misses = (5..10).flat_map(|row| (0..10).map(move |col| Coord::new(row, col).unwrap()));

        let mut last = None;
        for coord in targets {
            let outcome = session.fire(Seat::First, 1, coord).await.unwrap();
            if !outcome.game_over {
                let miss = misses.next().unwrap();
                session.fire(Seat::Second, 2, miss).await.unwrap();
            }
            last = Some(outcome);
        }

        let last = last.unwrap();
        assert!(last.game_over);
        assert_eq!(last.sunk, Some("Destroyer"));
        assert_eq!(session.phase(), Phase::GameOver);
        assert!(drain_texts(&mut a).iter().any(|t| t == "GAME OVER Alice wins"));
    }

    // =====================================================================
    // forfeit_turn()
    // =====================================================================

    #[tokio::test]
    async fn test_forfeit_turn_only_for_current_player() {
        let (session, _a, _b) = in_progress().await;
        assert!(!session.forfeit_turn(Seat::Second).await);
        assert!(session.forfeit_turn(Seat::First).await);
        assert_eq!(session.turn().await, Seat::Second);
    }

    #[tokio::test]
    async fn test_turn_change_wakes_turn_subscribers() {
        let (session, _a, _b) = in_progress().await;
        let mut turn = session.subscribe_turn();
        turn.borrow_and_update();

        session.fire(Seat::First, 2, at("J10")).await.unwrap();
        assert!(turn.has_changed().unwrap());
        assert_eq!(*turn.borrow_and_update(), Seat::Second);

        assert!(session.forfeit_turn(Seat::Second).await);
        assert!(turn.has_changed().unwrap());
        assert_eq!(*turn.borrow_and_update(), Seat::First);
    }

    #[tokio::test]
    async fn test_fire_with_long_names_every_frame_encodes() {
        let long = "W".repeat(250);
        let session = Session::new(SessionConfig::default(), [long.clone(), "Bob".to_string()]);
        let (a_tx, _a) = mpsc::unbounded_channel();
        let (b_tx, mut b) = mpsc::unbounded_channel();
        let (s_tx, mut s) = mpsc::unbounded_channel();
        session.attach(Seat::First, a_tx).await.unwrap();
        session.attach(Seat::Second, b_tx).await.unwrap();
        place_fleet(&session, Seat::First).await;
        place_fleet(&session, Seat::Second).await;
        session.attach_spectator("Carol", s_tx).await.unwrap();

        session.fire(Seat::First, 2, at("J10")).await.unwrap();
        session.quit(Seat::First, 3).await;

        let mut fire_reports = 0;
        for inbox in [&mut b, &mut s] {
            while let Ok(message) = inbox.try_recv() {
                if let SessionOutbound::Packet(packet) = message {
                    assert!(packet.encode().is_ok(), "{} frame too long", packet.kind);
                    if packet.kind == PacketKind::Fire {
                        fire_reports += 1;
                    }
                }
            }
        }
        assert_eq!(fire_reports, 2);
    }

    // =====================================================================
    // quit() / rematch
    // =====================================================================

    #[tokio::test]
    async fn test_quit_terminates_and_closes_everyone() {
        let (session, _a, mut b) = in_progress().await;
        let mut phase = session.subscribe();

        session.quit(Seat::First, 7).await;

        assert_eq!(session.phase(), Phase::Terminated);
        assert!(phase.has_changed().unwrap());
        let mut saw_win = false;
        let mut saw_close = false;
        while let Ok(message) = b.try_recv() {
            match message {
                SessionOutbound::Packet(p) => saw_win |= p.text().unwrap() == "Alice quit. You win!",
                SessionOutbound::Close => saw_close = true,
            }
        }
        assert!(saw_win && saw_close);
    }

    #[tokio::test]
    async fn test_answer_rematch_outside_game_over_is_wrong_phase() {
        let (session, _a, _b) = in_progress().await;
        assert_eq!(
            session.answer_rematch(Seat::First, 1, RematchAnswer::Yes).await,
            Err(GameError::WrongPhase(Phase::InProgress))
        );
    }

    // =====================================================================
    // spectators
    // =====================================================================

    #[tokio::test]
    async fn test_attach_spectator_respects_limit() {
        let session = Session::new(
            SessionConfig {
                max_spectators: 1,
                ..SessionConfig::default()
            },
            ["Alice".to_string(), "Bob".to_string()],
        );
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let id = session.attach_spectator("Carol", tx1).await.unwrap();
        assert_eq!(
            session.attach_spectator("Dave", tx2.clone()).await,
            Err(GameError::SessionFull)
        );
        assert!(!session.has_spectator_capacity().await);

        session.detach_spectator(id).await;
        assert!(session.attach_spectator("Dave", tx2).await.is_ok());
    }
}
