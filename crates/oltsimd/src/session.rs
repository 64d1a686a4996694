//! Controller sessions.
//!
//! A session is what `EnableIndication` opens: one outbound indication
//! stream, one dispatch task per device and the telemetry task, all scoped to
//! a single [`CancellationToken`]. Opening a new session cancels the previous
//! one; a reboot closes the device channels, lets the loops drain and then
//! cancels whatever is left.

use crate::device::{Olt, OltEvent, OltState, PonState};
use crate::dispatch;
use crate::error::{OltError, Result};
use crate::events::{EventType, SimEvent};
use crate::message::Message;
use crate::stream::{IndicationReceiver, IndicationStream};
use crate::telemetry;
use oltsim_common::{ChannelReceiver, DeviceChannel};
use oltsim_types::{ControlledActivation, OperState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub(crate) struct Session {
    id: Uuid,
    token: CancellationToken,
    loops: JoinSet<()>,
    telemetry: Option<JoinHandle<()>>,
}

impl Session {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
            loops: JoinSet::new(),
            telemetry: None,
        }
    }

    /// Waits up to `grace` for every dispatch loop to finish.
    async fn join_loops(&mut self, grace: Duration) -> bool {
        let id = self.id;
        let loops = &mut self.loops;
        let join_all = async move {
            while let Some(res) = loops.join_next().await {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!(session = %id, error = %e, "dispatch loop panicked");
                    }
                }
            }
        };
        tokio::time::timeout(grace, join_all).await.is_ok()
    }

    async fn stop_telemetry(&mut self) {
        if let Some(handle) = self.telemetry.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(session = %self.id, error = %e, "telemetry task panicked");
                }
            }
        }
    }

    /// Cancels the session and waits up to `grace` for its loops to hand
    /// their receivers back.
    pub(crate) async fn cancel(mut self, grace: Duration) {
        info!(session = %self.id, "cancelling session");
        self.token.cancel();
        if !self.join_loops(grace).await {
            warn!(session = %self.id, "dispatch loops still running after grace period");
            self.loops.detach_all();
        }
        self.stop_telemetry().await;
    }

    /// Lets the loops drain their closed channels for up to `grace`, then
    /// cancels the session.
    pub(crate) async fn drain(mut self, grace: Duration) {
        if !self.join_loops(grace).await {
            debug!(session = %self.id, "dispatch loops did not drain, cancelling");
        }
        self.token.cancel();
        while self.loops.join_next().await.is_some() {}
        self.stop_telemetry().await;
        info!(session = %self.id, "session closed");
    }
}

/// Takes the receiving end of a channel for a new session.
///
/// A receiver still held by a loop of a detached session is abandoned by
/// resetting the channel.
fn claim_receiver(channel: &DeviceChannel<Message>) -> Option<ChannelReceiver<Message>> {
    channel.take_receiver().or_else(|| {
        warn!(channel = channel.name(), "receiver held by a stale session, resetting channel");
        channel.close();
        channel.reopen();
        channel.take_receiver()
    })
}

impl Olt {
    fn ensure_not_rebooting(&self) -> Result<()> {
        if self.internal_state() == OltState::Deleted {
            error!(olt_id = self.id, "cannot enable olt while it is rebooting");
            return Err(OltError::DeviceNotReady(format!("olt-{}-is-rebooting", self.id)));
        }
        Ok(())
    }

    /// Opens a controller session and returns its indication stream.
    ///
    /// The first indications queued are OLT-up and one NNI-up per NNI. What
    /// follows depends on whether a session existed before and on the
    /// controlled activation mode.
    pub async fn enable(self: &Arc<Self>) -> Result<IndicationReceiver> {
        self.ensure_not_rebooting()?;
        info!(olt_id = self.id, "received enable indication");
        self.events.publish(SimEvent::olt(EventType::OltEnableReceived, self.id));

        let mut session = self.session.lock().await;
        // A reboot may have started while waiting for the lock.
        self.ensure_not_rebooting()?;

        let reconnect = self.had_session.swap(true, Ordering::AcqRel);
        if let Some(previous) = session.take() {
            info!(olt_id = self.id, "replacing previous session");
            previous.cancel(self.config.reconnect_grace()).await;
        }

        let (stream, rx) = IndicationStream::channel(self.config.simulator.stream_buffer);
        let mut next = Session::new(stream.session_id());
        *self.stream.write() = Some(stream.clone());

        match claim_receiver(&self.channel) {
            Some(olt_rx) => {
                next.loops.spawn(dispatch::olt_loop(
                    Arc::clone(self),
                    olt_rx,
                    stream.clone(),
                    next.token.clone(),
                ));
            }
            None => error!(olt_id = self.id, "olt channel unavailable"),
        }

        for onu in self.onus() {
            for uni in onu.uni_ports() {
                uni.update_stream(stream.clone());
            }
            match claim_receiver(onu.channel()) {
                Some(onu_rx) => {
                    next.loops.spawn(dispatch::onu_loop(
                        Arc::clone(self),
                        Arc::clone(onu),
                        onu_rx,
                        stream.clone(),
                        next.token.clone(),
                    ));
                }
                None => error!(serial = %onu.serial_number(), "onu channel unavailable"),
            }
        }

        if self.config.telemetry.enabled && !self.is_perf() {
            next.telemetry = Some(tokio::spawn(telemetry::periodic_port_stats(
                Arc::clone(self),
                stream.clone(),
                next.token.clone(),
            )));
        }

        info!(olt_id = self.id, session = %next.id, reconnect, "session established");
        *session = Some(next);

        self.send(Message::OltIndication {
            oper_state: OperState::Up,
        })
        .await?;
        for nni in &self.nnis {
            self.send(Message::NniIndication {
                nni_id: nni.id,
                oper_state: OperState::Up,
            })
            .await?;
        }

        if reconnect {
            for pon in &self.pons {
                if pon.internal_state() == PonState::Disabled {
                    self.send(Message::PonIndication {
                        pon_id: pon.id,
                        oper_state: OperState::Up,
                    })
                    .await?;
                }
            }
            if self.mode != ControlledActivation::OnlyOnu {
                for onu in self.onus() {
                    onu.rediscover(Duration::ZERO).await;
                }
            }
        } else if self.mode.auto_enables_pons() {
            for pon in &self.pons {
                self.send(Message::PonIndication {
                    pon_id: pon.id,
                    oper_state: OperState::Up,
                })
                .await?;
            }
        }

        Ok(rx)
    }

    /// Runs the reboot sequence to completion.
    ///
    /// A reboot of an enabled chassis is soft: ONUs are disabled silently.
    /// Otherwise each ONU that was not disabled yet announces ONU-down.
    pub async fn restart(self: &Arc<Self>) -> Result<()> {
        let delay = self.config.reboot_delay();
        info!(olt_id = self.id, delay_ms = delay.as_millis() as u64, "simulating olt restart");
        self.events.publish(SimEvent::olt(EventType::OltRebootReceived, self.id));

        self.clear_previously_connected();
        let soft = self.internal_state() == OltState::Enabled;
        if soft {
            info!(olt_id = self.id, "this is an olt soft reboot");
        }

        if let Err(e) = self.fire(OltEvent::Delete) {
            error!(olt_id = self.id, error = %e, "error deleting olt");
            return Err(e.into());
        }

        for onu in self.onus() {
            if let Err(e) = self.disable_onu(onu, !soft).await {
                warn!(serial = %onu.serial_number(), error = %e, "failed to disable onu on reboot");
            }
        }

        let drain = self.config.reboot_drain();
        if !drain.is_zero() {
            tokio::time::sleep(drain).await;
        }

        // Held until the chassis is initialized again so Enable cannot progress.
        let mut session = self.session.lock().await;

        self.channel.close();
        for onu in self.onus() {
            onu.channel().close();
        }
        if let Some(previous) = session.take() {
            previous.drain(self.config.reconnect_grace()).await;
        }
        *self.stream.write() = None;
        for onu in self.onus() {
            for uni in onu.uni_ports() {
                uni.clear_stream();
            }
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let signature = self.regenerate_signature();
        let initialized = self.fire(OltEvent::Initialize);
        drop(session);

        match initialized {
            Ok(_) => {
                info!(olt_id = self.id, signature, "olt restart completed");
                Ok(())
            }
            Err(e) => {
                error!(olt_id = self.id, error = %e, "error initializing olt");
                Err(e.into())
            }
        }
    }

    /// Starts the reboot sequence in the background and returns immediately.
    pub fn reboot(self: &Arc<Self>) {
        info!(olt_id = self.id, "received reboot");
        let olt = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = olt.restart().await {
                error!(olt_id = olt.id, error = %e, "olt reboot failed");
            }
        });
    }
}
