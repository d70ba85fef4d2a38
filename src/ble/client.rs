//! Central-side "find me" chain: connect, find the UART RX characteristic,
//! write the trigger, then drop the link after a settle delay.
//!
//! The client never looks at the lossy pending event. It reads the state
//! the session already applied in callback context, so a dropped
//! intermediate event cannot stall the chain.

use crate::ble::discovery::DiscoveryPhase;
use crate::ble::nus;
use crate::ble::radio::Radio;
use crate::ble::session::{BleSession, LinkSide};
use crate::ble::Address;
use crate::error::{Error, Result};
use crate::Millis;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    Idle,
    Connecting { peer: Address, deadline: Millis },
    Service,
    Characteristic,
    /// Waiting for the link to go away.
    Closing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientOutcome {
    /// The trigger was written; a disconnect is scheduled.
    Delivered,
    /// The chain failed and the link is being dropped.
    Aborted(Error),
    /// The peer never answered the connect request.
    TimedOut,
}

pub struct FindMeClient {
    stage: Stage,
    connect_timeout_ms: Millis,
}

impl FindMeClient {
    pub const fn new(connect_timeout_ms: Millis) -> Self {
        Self {
            stage: Stage::Idle,
            connect_timeout_ms,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_busy(&self) -> bool {
        self.stage != Stage::Idle
    }

    /// Begin the chain against `peer`. Ignored while a chain is running.
    pub fn start(
        &mut self,
        session: &mut BleSession,
        radio: &mut impl Radio,
        peer: Address,
        now: Millis,
    ) -> Result<()> {
        if self.is_busy() {
            debug!("find-me: busy, ignoring {}", peer);
            return Ok(());
        }
        session.connect(radio, peer)?;
        self.stage = Stage::Connecting {
            peer,
            deadline: now + self.connect_timeout_ms,
        };
        Ok(())
    }

    /// Advance the chain from the session's current state.
    pub fn poll(
        &mut self,
        session: &mut BleSession,
        radio: &mut impl Radio,
        now: Millis,
        settle_ms: Millis,
    ) -> Option<ClientOutcome> {
        match self.stage {
            Stage::Idle => None,
            Stage::Connecting { peer, deadline } => {
                match session.link() {
                    Some(link) if link.side == LinkSide::Central && link.peer == peer => {
                        self.step(session.discover_service(radio, nus::SERVICE_UUID), Stage::Service)
                            .err()
                            .map(|e| self.abort(session, radio, e))
                    }
                    _ if now >= deadline => {
                        warn!("find-me: connect timed out");
                        if let Err(e) = session.cancel_connect(radio) {
                            warn!("find-me: cancel failed: {}", e);
                        }
                        self.stage = Stage::Idle;
                        Some(ClientOutcome::TimedOut)
                    }
                    _ => None,
                }
            }
            Stage::Service => {
                if let Some(outcome) = self.check_link(session, radio) {
                    return Some(outcome);
                }
                match session.discovery() {
                    Some(DiscoveryPhase::ServicesDone(_)) => self
                        .step(
                            session.discover_characteristic(radio, nus::RX_UUID),
                            Stage::Characteristic,
                        )
                        .err()
                        .map(|e| self.abort(session, radio, e)),
                    _ => None,
                }
            }
            Stage::Characteristic => {
                if let Some(outcome) = self.check_link(session, radio) {
                    return Some(outcome);
                }
                match session.discovery() {
                    Some(DiscoveryPhase::CharacteristicsDone { .. }) => {
                        let sent = session
                            .write_discovered(radio, nus::FIND_ME.as_bytes())
                            .and_then(|()| session.schedule_disconnect(now + settle_ms));
                        match sent {
                            Ok(()) => {
                                info!("find-me: trigger written");
                                self.stage = Stage::Closing;
                                Some(ClientOutcome::Delivered)
                            }
                            Err(e) => Some(self.abort(session, radio, e)),
                        }
                    }
                    _ => None,
                }
            }
            Stage::Closing => {
                if !session.is_connected() {
                    self.stage = Stage::Idle;
                }
                None
            }
        }
    }

    fn step(&mut self, issued: Result<()>, next: Stage) -> Result<()> {
        issued?;
        self.stage = next;
        Ok(())
    }

    /// Terminal checks shared by the discovery stages.
    fn check_link(
        &mut self,
        session: &mut BleSession,
        radio: &mut impl Radio,
    ) -> Option<ClientOutcome> {
        if !session.is_connected() {
            self.stage = Stage::Idle;
            return Some(ClientOutcome::Aborted(Error::NotConnected));
        }
        session
            .take_discovery_failure()
            .map(|e| self.abort(session, radio, Error::Discovery(e)))
    }

    fn abort(
        &mut self,
        session: &mut BleSession,
        radio: &mut impl Radio,
        error: Error,
    ) -> ClientOutcome {
        warn!("find-me: aborted: {}", error);
        if session.is_connected() {
            if let Err(e) = session.disconnect(radio) {
                warn!("find-me: disconnect failed: {}", e);
            }
            self.stage = Stage::Closing;
        } else {
            self.stage = Stage::Idle;
        }
        ClientOutcome::Aborted(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::session::tests::{FakeRadio, PEER};
    use crate::ble::{AttrHandle, CharacteristicInfo, ConnHandle, HandleRange, RadioEvent};
    use crate::error::DiscoveryError;

    const C: ConnHandle = ConnHandle(1);

    fn service_found(s: &mut BleSession, r: &mut FakeRadio) {
        s.on_radio_event(
            RadioEvent::ServiceResult {
                conn: C,
                range: HandleRange {
                    start: AttrHandle(10),
                    end: AttrHandle(20),
                },
                uuid: nus::SERVICE_UUID,
            },
            r,
        );
        s.on_radio_event(RadioEvent::ServiceDone { conn: C, status: 0 }, r);
    }

    fn rx_found(s: &mut BleSession, r: &mut FakeRadio) {
        let info = CharacteristicInfo {
            def_handle: AttrHandle(13),
            value_handle: AttrHandle(14),
            properties: 0x08,
            uuid: nus::RX_UUID,
        };
        s.on_radio_event(RadioEvent::CharacteristicResult { conn: C, info }, r);
        s.on_radio_event(RadioEvent::CharacteristicDone { conn: C, status: 0 }, r);
    }

    fn connected() -> (FindMeClient, BleSession, FakeRadio) {
        let mut radio = FakeRadio::default();
        let mut session = BleSession::new("QuadCorder1");
        let mut client = FindMeClient::new(5_000);
        session.scan(&mut radio).unwrap();
        client.start(&mut session, &mut radio, PEER, 0).unwrap();
        session.on_radio_event(RadioEvent::PeripheralConnect { conn: C, peer: PEER }, &mut radio);
        assert_eq!(client.poll(&mut session, &mut radio, 10, 250), None);
        assert_eq!(client.stage(), Stage::Service);
        (client, session, radio)
    }

    #[test]
    fn full_chain_writes_and_disconnects() {
        let (mut client, mut session, mut radio) = connected();
        service_found(&mut session, &mut radio);
        assert_eq!(client.poll(&mut session, &mut radio, 20, 250), None);
        assert_eq!(client.stage(), Stage::Characteristic);

        rx_found(&mut session, &mut radio);
        assert_eq!(
            client.poll(&mut session, &mut radio, 30, 250),
            Some(ClientOutcome::Delivered)
        );
        assert_eq!(radio.written, [(AttrHandle(14), b"find me".to_vec())]);
        assert_eq!(session.disconnect_due(), Some(280));

        assert!(!session.housekeeping(279, &mut radio));
        assert!(session.housekeeping(280, &mut radio));
        session.on_radio_event(
            RadioEvent::PeripheralDisconnect { conn: C, peer: PEER },
            &mut radio,
        );
        assert_eq!(client.poll(&mut session, &mut radio, 300, 250), None);
        assert!(!client.is_busy());
        assert_eq!(
            radio.log,
            [
                "scan_start",
                "connect",
                "scan_stop",
                "discover_services",
                "discover_characteristics",
                "write",
                "disconnect 1"
            ]
        );
    }

    #[test]
    fn failed_service_discovery_aborts() {
        let (mut client, mut session, mut radio) = connected();
        session.on_radio_event(RadioEvent::ServiceDone { conn: C, status: 0x0A }, &mut radio);
        assert_eq!(
            client.poll(&mut session, &mut radio, 20, 250),
            Some(ClientOutcome::Aborted(Error::Discovery(
                DiscoveryError::Status(0x0A)
            )))
        );
        assert_eq!(client.stage(), Stage::Closing);
        assert_eq!(radio.count("disconnect"), 1);
        assert!(radio.written.is_empty());
    }

    #[test]
    fn missing_rx_aborts() {
        let (mut client, mut session, mut radio) = connected();
        service_found(&mut session, &mut radio);
        client.poll(&mut session, &mut radio, 20, 250);
        session.on_radio_event(RadioEvent::CharacteristicDone { conn: C, status: 0 }, &mut radio);
        assert_eq!(
            client.poll(&mut session, &mut radio, 30, 250),
            Some(ClientOutcome::Aborted(Error::Discovery(
                DiscoveryError::NotFound
            )))
        );
    }

    #[test]
    fn link_loss_mid_chain() {
        let (mut client, mut session, mut radio) = connected();
        session.on_radio_event(
            RadioEvent::PeripheralDisconnect { conn: C, peer: PEER },
            &mut radio,
        );
        assert_eq!(
            client.poll(&mut session, &mut radio, 20, 250),
            Some(ClientOutcome::Aborted(Error::NotConnected))
        );
        assert!(!client.is_busy());
    }

    #[test]
    fn connect_timeout_cancels() {
        let mut radio = FakeRadio::default();
        let mut session = BleSession::new("QuadCorder1");
        let mut client = FindMeClient::new(1_000);
        client.start(&mut session, &mut radio, PEER, 0).unwrap();
        assert_eq!(client.poll(&mut session, &mut radio, 999, 250), None);
        assert_eq!(
            client.poll(&mut session, &mut radio, 1_000, 250),
            Some(ClientOutcome::TimedOut)
        );
        assert_eq!(radio.count("cancel_connect"), 1);
        assert!(!client.is_busy());
    }

    #[test]
    fn second_start_is_ignored() {
        let (mut client, mut session, mut radio) = connected();
        client.start(&mut session, &mut radio, PEER, 50).unwrap();
        assert_eq!(radio.count("connect"), 1);
        assert_eq!(client.stage(), Stage::Service);
    }
}
