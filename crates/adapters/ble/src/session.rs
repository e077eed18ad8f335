//! GATT session — one bounded connect/auth/read/write/disconnect cycle.
//!
//! The session owns the cycle deadline: every await on the link is wrapped
//! in [`tokio::time::timeout_at`], so a peripheral that stops responding
//! can never hold the radio past the deadline. Whatever happens inside the
//! cycle, the link gets a best-effort disconnect before control returns —
//! the radio is a shared resource and a dangling connection would starve
//! every other device.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use ecotrv_app::ports::{LinkError, ThermostatLink};
use ecotrv_domain::identity::{DeviceIdentity, SecretKey};
use ecotrv_domain::state::{DeviceMode, StateDelta, Temperature};

use crate::codec::{self, Temperatures};
use crate::crypto;
use crate::error::SessionError;

/// Retries per characteristic operation before the cycle fails.
const MAX_RETRIES: u32 = 2;
/// Pause between retries of a failed characteristic operation.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
/// Upper bound on the post-cycle disconnect, so a dead link cannot hold
/// the session open after the deadline already fired.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Connection establishment in progress.
    Connecting,
    /// PIN handshake in progress.
    Authenticating,
    /// Connected and authenticated, between operations.
    Ready,
    /// A characteristic read is in flight.
    Reading,
    /// A characteristic write is in flight.
    Writing,
    /// Teardown in progress.
    Disconnecting,
    /// Terminal: the cycle failed. Reached from any non-terminal state on
    /// timeout or protocol error.
    Failed,
}

/// A state change requested by the presentation layer, applied
/// read-modify-write so the rest of the frame is preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Change the set-point temperature.
    SetTargetTemperature(Temperature),
    /// Change the operating mode.
    SetMode(DeviceMode),
}

/// One poll cycle against a single peripheral.
///
/// Transient by design: created at poll start, dropped at poll end. The
/// per-cycle context (deadline, retry counters) lives on the stack of
/// [`run_cycle`](Self::run_cycle) and never survives into the next cycle.
pub struct GattSession<'a, L: ThermostatLink> {
    link: &'a L,
    identity: &'a DeviceIdentity,
    state: SessionState,
}

impl<'a, L: ThermostatLink> GattSession<'a, L> {
    /// Create a session for one cycle against `link`.
    #[must_use]
    pub fn new(link: &'a L, identity: &'a DeviceIdentity) -> Self {
        Self {
            link,
            identity,
            state: SessionState::Disconnected,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run one full cycle: connect, authenticate, apply `commands`, read
    /// every characteristic of interest, disconnect.
    ///
    /// The returned delta carries everything that was successfully read.
    /// A disconnect is attempted on **every** exit path.
    ///
    /// # Errors
    ///
    /// [`SessionError::Timeout`] when `timeout` elapses, [`SessionError::Auth`]
    /// when the device rejects the PIN, [`SessionError::Link`] /
    /// [`SessionError::Protocol`] / [`SessionError::Crypto`] for the
    /// respective layer failures.
    pub async fn run_cycle(
        &mut self,
        timeout: Duration,
        commands: &[Command],
    ) -> Result<StateDelta, SessionError> {
        let deadline = Instant::now() + timeout;
        let result = self.run_cycle_inner(deadline, commands).await;

        self.state = SessionState::Disconnecting;
        match tokio::time::timeout(DISCONNECT_GRACE, self.link.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(mac = %self.identity.address, %err, "failed to disconnect")
            }
            Err(_) => {
                tracing::warn!(mac = %self.identity.address, "disconnect did not complete in time")
            }
        }

        self.state = if result.is_ok() {
            SessionState::Disconnected
        } else {
            SessionState::Failed
        };
        result
    }

    async fn run_cycle_inner(
        &mut self,
        deadline: Instant,
        commands: &[Command],
    ) -> Result<StateDelta, SessionError> {
        let key = self
            .identity
            .secret_key
            .ok_or(SessionError::MissingSecretKey)?;

        self.state = SessionState::Connecting;
        bounded(deadline, self.link.connect()).await??;

        self.authenticate(deadline).await?;

        for command in commands {
            self.execute(deadline, &key, *command).await?;
        }

        let mut delta = StateDelta {
            available: Some(true),
            observed_at: Some(Utc::now()),
            ..StateDelta::default()
        };

        let battery = self.read_retrying(deadline, codec::CHAR_BATTERY).await?;
        delta.battery_level = Some(codec::decode_battery(&battery)?);

        let temperatures = self.read_decrypted(deadline, codec::CHAR_TEMPERATURE, &key).await?;
        let temperatures = codec::decode_temperatures(&temperatures)?;
        delta.room_temperature = Some(temperatures.room);
        delta.target_temperature = Some(temperatures.target);

        let settings = self.read_decrypted(deadline, codec::CHAR_SETTINGS, &key).await?;
        delta.settings = Some(codec::decode_settings(&settings)?);

        let errors = self.read_decrypted(deadline, codec::CHAR_ERRORS, &key).await?;
        delta.problems = Some(codec::decode_problems(&errors)?);

        Ok(delta)
    }

    /// Write the PIN frame when a PIN is configured; devices without one
    /// go straight to `Ready`. The device nacks a wrong PIN by rejecting
    /// the GATT write, which is an auth failure, not a link failure.
    async fn authenticate(&mut self, deadline: Instant) -> Result<(), SessionError> {
        let Some(pin) = self.identity.pin else {
            self.state = SessionState::Ready;
            return Ok(());
        };

        self.state = SessionState::Authenticating;
        let frame = codec::encode_pin(pin);
        match bounded(deadline, self.link.write(codec::CHAR_PIN, &frame)).await? {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(err @ LinkError::Write(_)) => Err(SessionError::Auth(err)),
            Err(err) => Err(SessionError::Link(err)),
        }
    }

    /// Apply one queued command as a read-modify-write so fields the
    /// command does not touch keep their current device-side values.
    async fn execute(
        &mut self,
        deadline: Instant,
        key: &SecretKey,
        command: Command,
    ) -> Result<(), SessionError> {
        match command {
            Command::SetTargetTemperature(target) => {
                let current = self.read_decrypted(deadline, codec::CHAR_TEMPERATURE, key).await?;
                let current = codec::decode_temperatures(&current)?;
                let frame = codec::encode_temperatures(Temperatures {
                    target,
                    room: current.room,
                });
                self.write_encrypted(deadline, codec::CHAR_TEMPERATURE, &frame, key)
                    .await
            }
            Command::SetMode(mode) => {
                let current = self.read_decrypted(deadline, codec::CHAR_SETTINGS, key).await?;
                let mut settings = codec::decode_settings(&current)?;
                settings.mode = mode;
                let frame = codec::encode_settings(&settings);
                self.write_encrypted(deadline, codec::CHAR_SETTINGS, &frame, key)
                    .await
            }
        }
    }

    async fn read_decrypted(
        &mut self,
        deadline: Instant,
        uuid: uuid::Uuid,
        key: &SecretKey,
    ) -> Result<Vec<u8>, SessionError> {
        let ciphertext = self.read_retrying(deadline, uuid).await?;
        Ok(crypto::decrypt(&ciphertext, key)?)
    }

    async fn write_encrypted(
        &mut self,
        deadline: Instant,
        uuid: uuid::Uuid,
        plaintext: &[u8],
        key: &SecretKey,
    ) -> Result<(), SessionError> {
        let ciphertext = crypto::encrypt(plaintext, key)?;
        self.write_retrying(deadline, uuid, &ciphertext).await
    }

    async fn read_retrying(
        &mut self,
        deadline: Instant,
        uuid: uuid::Uuid,
    ) -> Result<Vec<u8>, SessionError> {
        let mut attempt = 0;
        loop {
            self.state = SessionState::Reading;
            match bounded(deadline, self.link.read(uuid)).await? {
                Ok(bytes) => {
                    self.state = SessionState::Ready;
                    return Ok(bytes);
                }
                Err(err) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        mac = %self.identity.address,
                        %uuid,
                        %err,
                        attempt,
                        "characteristic read failed, retrying"
                    );
                    bounded(deadline, tokio::time::sleep(RETRY_BACKOFF)).await?;
                }
                Err(err) => return Err(SessionError::Link(err)),
            }
        }
    }

    async fn write_retrying(
        &mut self,
        deadline: Instant,
        uuid: uuid::Uuid,
        payload: &[u8],
    ) -> Result<(), SessionError> {
        let mut attempt = 0;
        loop {
            self.state = SessionState::Writing;
            match bounded(deadline, self.link.write(uuid, payload)).await? {
                Ok(()) => {
                    self.state = SessionState::Ready;
                    return Ok(());
                }
                Err(err) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        mac = %self.identity.address,
                        %uuid,
                        %err,
                        attempt,
                        "characteristic write failed, retrying"
                    );
                    bounded(deadline, tokio::time::sleep(RETRY_BACKOFF)).await?;
                }
                Err(err) => return Err(SessionError::Link(err)),
            }
        }
    }
}

/// Bound a link operation by the cycle deadline; an exceeded deadline
/// cancels the operation by dropping its future.
async fn bounded<T>(deadline: Instant, future: impl Future<Output = T>) -> Result<T, SessionError> {
    tokio::time::timeout_at(deadline, future)
        .await
        .map_err(|_| SessionError::Timeout)
}
