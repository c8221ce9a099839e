//! Pinpad service — the hexagonal core.
//!
//! [`PinpadService`] owns the FSM, the session context, the code verifier
//! and the HOTP counter store.  Outbound values leave through the
//! [`PublishPort`], the indicator level through the [`IndicatorPort`];
//! inbound payloads come in through [`ingest`](PinpadService::ingest) and
//! time through the [`ClockPort`] passed to each call.
//!
//! ```text
//!  ingest(bytes) ──▶ ┌────────────────────────────┐ ──▶ PublishPort
//!                    │       PinpadService        │ ──▶ IndicatorPort
//!  poll(clock)  ──▶  │ FSM · Verifier · Counter   │ ──▶ CallbackHub
//!                    └────────────────────────────┘
//!                                 │
//!                                 ▼
//!                            CounterPort
//! ```
//!
//! Everything here runs on the control loop.  Malformed payloads and
//! commands that arrive in the wrong state are dropped with a log line;
//! nothing is reported back to the peer except characteristic values.

use log::{debug, info, warn};

use crate::config::{PinpadConfig, SecurityMode};
use crate::fsm::context::PinpadContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::otp::{CodeVerifier, Verdict};
use crate::rpc::channels::LinkEvent;
use crate::rpc::codec::{self, MAX_PAYLOAD_LEN};

use super::commands::PinpadCommand;
use super::counter::CounterStore;
use super::events::{CallbackHub, StateSnapshot};
use super::ports::{ClockPort, ConfigError, CounterPort, IndicatorPort, NoIndicator, PublishPort};

// ───────────────────────────────────────────────────────────────
// PinpadService
// ───────────────────────────────────────────────────────────────

pub struct PinpadService<S: CounterPort, P: PublishPort, I: IndicatorPort = NoIndicator> {
    fsm: Fsm,
    ctx: PinpadContext,
    config: PinpadConfig,
    verifier: CodeVerifier,
    counter: CounterStore<S>,
    publisher: P,
    indicator: I,
    hub: CallbackHub,
    /// Staging buffer for the payload being processed.
    incoming: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
    /// Cached JSON rendering of the user-commands table.
    user_commands_json: String,
    setup_complete: bool,
}

impl<S: CounterPort, P: PublishPort, I: IndicatorPort> PinpadService<S, P, I> {
    /// Construct the service in `Stopped`.  Loads the HOTP counter.
    ///
    /// Does **not** publish anything; call [`setup`](Self::setup) next.
    pub fn new(config: PinpadConfig, counter_port: S, publisher: P, indicator: I) -> Self {
        let mut ctx = PinpadContext::new(config.hold_ms);
        let mut fsm = Fsm::new(build_state_table(), StateId::Stopped);
        fsm.start(&mut ctx);

        Self {
            fsm,
            ctx,
            verifier: CodeVerifier::new(&config),
            user_commands_json: config.user_commands_json(),
            config,
            counter: CounterStore::load(counter_port),
            publisher,
            indicator,
            hub: CallbackHub::new(),
            incoming: heapless::Vec::new(),
            setup_complete: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Validate the configuration and publish the initial characteristic
    /// values.  Required before [`start`](Self::start).
    pub fn setup(&mut self) -> Result<(), ConfigError> {
        self.config.validate()?;

        if self.config.security_mode == SecurityMode::None {
            warn!("security mode 'none': every pin is accepted, authentication is disabled");
        }

        self.publisher.publish_status(self.fsm.current_state());
        self.publisher
            .publish_security_mode(self.config.security_mode);
        if self.counter.is_loaded() {
            self.publisher.publish_hotp_counter(self.counter.value());
        }
        self.publisher.publish_user_id("");
        self.publisher.publish_cmd("");
        self.apply_indicator();

        self.setup_complete = true;
        info!(
            "pinpad setup: mode={} digits={} commands={}",
            self.config.security_mode.as_str(),
            self.config.otp_digits,
            self.config.user_commands.len()
        );
        Ok(())
    }

    /// `Stopped` → `Idle`.  Ignored before setup or when already running.
    pub fn start(&mut self) {
        if !self.setup_complete {
            warn!("start() before setup(), ignoring");
            return;
        }
        if self.fsm.current_state() != StateId::Stopped {
            debug!("start() while {:?}, ignoring", self.fsm.current_state());
            return;
        }
        self.incoming.clear();
        if self.fsm.force_transition(StateId::Idle, &mut self.ctx) {
            self.on_transition();
        }
    }

    /// Any state → `Stopped`, clearing all session data.  Idempotent.
    pub fn stop(&mut self) {
        self.incoming.clear();
        if self.fsm.force_transition(StateId::Stopped, &mut self.ctx) {
            self.on_transition();
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Process one complete payload from the RPC characteristic.
    pub fn ingest(&mut self, payload: &[u8], clock: &impl ClockPort) {
        self.incoming.clear();

        if self.fsm.current_state() == StateId::Stopped {
            debug!("stopped, dropping {}-byte payload", payload.len());
            return;
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            warn!(
                "payload of {} bytes exceeds {} byte limit, dropped",
                payload.len(),
                MAX_PAYLOAD_LEN
            );
            return;
        }
        // Length checked above.
        let _ = self.incoming.extend_from_slice(payload);

        let parsed = codec::parse(&self.incoming);
        self.incoming.clear();

        match parsed {
            Ok(cmd) => {
                debug!("rx {} in {:?}", cmd.name(), self.fsm.current_state());
                self.ctx.now_ms = clock.now_ms();
                self.dispatch(cmd, clock);
            }
            Err(e) => debug!("malformed payload dropped: {}", e),
        }
    }

    /// Peer connection events from the BLE stack.
    pub fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => info!("client connected"),
            LinkEvent::Disconnected => self.on_client_disconnect(),
        }
    }

    /// Drop any partial input.  While `Idle` the selected user is cleared so
    /// the next peer starts fresh; a running hold is left alone.
    pub fn on_client_disconnect(&mut self) {
        self.incoming.clear();
        if self.fsm.current_state() == StateId::Idle && self.ctx.session.has_user() {
            self.ctx.session.clear();
            self.publisher.publish_user_id("");
            self.publisher.publish_cmd("");
        }
        info!("client disconnected");
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle: retry an unread counter or a pending counter
    /// write, then let the FSM expire a finished hold.
    pub fn poll(&mut self, clock: &impl ClockPort) {
        if self.counter.retry_load() {
            self.publisher.publish_hotp_counter(self.counter.value());
        }
        self.counter.flush();

        self.ctx.now_ms = clock.now_ms();
        if self.fsm.tick(&mut self.ctx).is_some() {
            self.on_transition();
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Started and not stopped.
    pub fn is_active(&self) -> bool {
        self.fsm.current_state() != StateId::Stopped
    }

    pub fn is_accepted(&self) -> bool {
        self.fsm.current_state() == StateId::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        self.fsm.current_state() == StateId::Rejected
    }

    pub fn get_userid(&self) -> &str {
        self.ctx.session.user_id()
    }

    pub fn get_cmd(&self) -> &str {
        self.ctx.session.cmd_id()
    }

    pub fn hotp_counter(&self) -> u32 {
        self.counter.value()
    }

    /// A counter write failed and is still waiting to be retried.
    pub fn counter_dirty(&self) -> bool {
        self.counter.is_dirty()
    }

    /// Bytes currently staged for parsing.  Always 0 between calls.
    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    pub fn config(&self) -> &PinpadConfig {
        &self.config
    }

    /// Register automation handlers.
    pub fn callbacks(&mut self) -> &mut CallbackHub {
        &mut self.hub
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn counter_port(&self) -> &S {
        self.counter.port()
    }

    pub fn counter_port_mut(&mut self) -> &mut S {
        self.counter.port_mut()
    }

    // ── Internal ──────────────────────────────────────────────

    fn dispatch(&mut self, cmd: PinpadCommand, clock: &impl ClockPort) {
        let state = self.fsm.current_state();
        match cmd {
            PinpadCommand::SelectUser(user) => {
                if state != StateId::Idle {
                    debug!("SelectUser in {:?}, dropped", state);
                    return;
                }
                if !self.ctx.session.set_user(&user) {
                    warn!("user id '{}' not stored, dropped", user);
                    return;
                }
                info!("user selected: '{}'", user);
                self.publisher.publish_user_id(&user);
                self.hub.fire_user_selected(&user);
            }
            PinpadCommand::SubmitPin { pin, cmd_id } => {
                if state != StateId::Idle {
                    debug!("SubmitPin in {:?}, dropped", state);
                    return;
                }
                if !self.ctx.session.has_user() {
                    debug!("SubmitPin without a selected user, dropped");
                    return;
                }
                if !self.ctx.session.set_cmd(&cmd_id) {
                    warn!("command id '{}' not stored, pin dropped", cmd_id);
                    return;
                }

                let verdict = self
                    .verifier
                    .verify(&pin, &mut self.counter, clock.unix_time_secs());
                if self.verifier.mode() == SecurityMode::Hotp && self.counter.is_loaded() {
                    self.publisher.publish_hotp_counter(self.counter.value());
                }

                let next = match verdict {
                    Verdict::Accepted => StateId::Accepted,
                    Verdict::Rejected => StateId::Rejected,
                };
                info!(
                    "pin for '{}' {}",
                    self.ctx.session.user_id(),
                    if verdict.is_accepted() { "accepted" } else { "rejected" }
                );
                if self.fsm.force_transition(next, &mut self.ctx) {
                    self.on_transition();
                }
            }
            PinpadCommand::RequestUserCommands => {
                self.publisher
                    .publish_user_commands(&self.user_commands_json);
            }
            PinpadCommand::InvokeUserCommand(cmd_id) => {
                if state != StateId::Accepted {
                    debug!("InvokeUserCommand in {:?}, dropped", state);
                    return;
                }
                if self.config.user_command(&cmd_id).is_none() {
                    warn!("unknown user command '{}', dropped", cmd_id);
                    return;
                }
                if !self.ctx.session.set_cmd(&cmd_id) {
                    warn!("command id '{}' not stored, dropped", cmd_id);
                    return;
                }
                info!("user command '{}' by '{}'", cmd_id, self.ctx.session.user_id());
                self.publisher.publish_cmd(&cmd_id);
                self.hub.fire_user_command(&cmd_id);
            }
        }
    }

    /// Publish and notify after the FSM moved.
    fn on_transition(&mut self) {
        let state = self.fsm.current_state();
        self.apply_indicator();
        self.publisher.publish_status(state);
        self.publisher.publish_user_id(self.ctx.session.user_id());
        self.publisher.publish_cmd(self.ctx.session.cmd_id());

        let snapshot = StateSnapshot::capture(state, &self.ctx.session);
        self.hub.fire_state_changed(&snapshot);
    }

    fn apply_indicator(&mut self) {
        self.indicator
            .set_indicator(self.config.status_indicator && self.ctx.indicator_on);
    }
}
