//! Per-connection GATT discovery cursor.
//!
//! Only one phase is ever active, so the cursor is a single tagged
//! variant rather than a bag of handles. Events for any other connection
//! are ignored, which keeps a stale "done" from a dropped link from being
//! applied to a new one.

use crate::ble::{AttrHandle, CharacteristicInfo, ConnHandle, HandleRange, RadioEvent, Uuid};
use crate::error::{DiscoveryError, Error, Result};

/// Client Characteristic Configuration descriptor.
pub const CCCD_UUID: Uuid = Uuid::Uuid16(0x2902);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryPhase {
    Services {
        uuid: Uuid,
        found: Option<HandleRange>,
    },
    ServicesDone(HandleRange),
    Characteristics {
        uuid: Uuid,
        service: HandleRange,
        found: Option<CharacteristicInfo>,
    },
    CharacteristicsDone {
        service: HandleRange,
        characteristic: CharacteristicInfo,
    },
    Descriptors {
        characteristic: CharacteristicInfo,
        cccd: Option<AttrHandle>,
    },
    DescriptorsDone {
        characteristic: CharacteristicInfo,
        cccd: Option<AttrHandle>,
    },
    Failed(DiscoveryError),
}

/// What applying one event did to the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Not for this cursor (other connection or other phase).
    Ignored,
    /// A result was recorded; the phase is still running.
    Recorded,
    /// The phase finished successfully.
    Completed,
    /// The phase finished without the handle we need.
    Failed(DiscoveryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryCursor {
    conn: ConnHandle,
    phase: DiscoveryPhase,
}

impl DiscoveryCursor {
    /// Start resolving the service `uuid` on `conn`.
    pub fn services(conn: ConnHandle, uuid: Uuid) -> Self {
        Self {
            conn,
            phase: DiscoveryPhase::Services { uuid, found: None },
        }
    }

    pub fn conn(&self) -> ConnHandle {
        self.conn
    }

    pub fn phase(&self) -> DiscoveryPhase {
        self.phase
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.phase, DiscoveryPhase::Failed(_))
    }

    /// Resolved characteristic, once characteristic discovery finished.
    pub fn characteristic(&self) -> Option<CharacteristicInfo> {
        match self.phase {
            DiscoveryPhase::CharacteristicsDone { characteristic, .. }
            | DiscoveryPhase::Descriptors { characteristic, .. }
            | DiscoveryPhase::DescriptorsDone { characteristic, .. } => Some(characteristic),
            _ => None,
        }
    }

    /// Advance to characteristic discovery. Returns the range to search.
    pub fn begin_characteristics(&mut self, uuid: Uuid) -> Result<HandleRange> {
        let service = match self.phase {
            DiscoveryPhase::ServicesDone(range)
            | DiscoveryPhase::Characteristics { service: range, .. }
            | DiscoveryPhase::CharacteristicsDone { service: range, .. } => range,
            _ => return Err(Error::NoDiscovery),
        };
        self.phase = DiscoveryPhase::Characteristics {
            uuid,
            service,
            found: None,
        };
        Ok(service)
    }

    /// Advance to descriptor discovery. Returns the range to search.
    pub fn begin_descriptors(&mut self) -> Result<HandleRange> {
        let (service, characteristic) = match self.phase {
            DiscoveryPhase::CharacteristicsDone {
                service,
                characteristic,
            } => (service, characteristic),
            _ => return Err(Error::NoDiscovery),
        };
        let start = characteristic.value_handle.0.saturating_add(1);
        self.phase = DiscoveryPhase::Descriptors {
            characteristic,
            cccd: None,
        };
        Ok(HandleRange {
            start: AttrHandle(start),
            end: service.end,
        })
    }

    fn finish(&mut self, status: u16, next: Option<DiscoveryPhase>) -> Step {
        let outcome = if status != 0 {
            Err(DiscoveryError::Status(status))
        } else {
            next.ok_or(DiscoveryError::NotFound)
        };
        match outcome {
            Ok(phase) => {
                self.phase = phase;
                Step::Completed
            }
            Err(e) => {
                self.phase = DiscoveryPhase::Failed(e);
                Step::Failed(e)
            }
        }
    }

    /// Apply a radio event.
    pub fn apply(&mut self, event: &RadioEvent) -> Step {
        if event.conn() != Some(self.conn) {
            return Step::Ignored;
        }

        match (&mut self.phase, event) {
            (
                DiscoveryPhase::Services { uuid, found },
                RadioEvent::ServiceResult {
                    range, uuid: seen, ..
                },
            ) if *seen == *uuid => {
                *found = Some(*range);
                Step::Recorded
            }
            (DiscoveryPhase::Services { found, .. }, RadioEvent::ServiceDone { status, .. }) => {
                let next = found.map(DiscoveryPhase::ServicesDone);
                self.finish(*status, next)
            }
            (
                DiscoveryPhase::Characteristics { uuid, found, .. },
                RadioEvent::CharacteristicResult { info, .. },
            ) if info.uuid == *uuid => {
                *found = Some(*info);
                Step::Recorded
            }
            (
                DiscoveryPhase::Characteristics { service, found, .. },
                RadioEvent::CharacteristicDone { status, .. },
            ) => {
                let service = *service;
                let next = found.map(|characteristic| DiscoveryPhase::CharacteristicsDone {
                    service,
                    characteristic,
                });
                self.finish(*status, next)
            }
            (
                DiscoveryPhase::Descriptors { cccd, .. },
                RadioEvent::DescriptorResult { handle, uuid, .. },
            ) => {
                if *uuid == CCCD_UUID {
                    *cccd = Some(*handle);
                }
                Step::Recorded
            }
            (
                DiscoveryPhase::Descriptors {
                    characteristic,
                    cccd,
                },
                RadioEvent::DescriptorDone { status, .. },
            ) => {
                // No CCCD is not a failure: not every characteristic notifies.
                let next = DiscoveryPhase::DescriptorsDone {
                    characteristic: *characteristic,
                    cccd: *cccd,
                };
                self.finish(*status, Some(next))
            }
            _ => Step::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVC: Uuid = Uuid::Uuid16(0x1234);
    const CHR: Uuid = Uuid::Uuid16(0x5678);
    const C: ConnHandle = ConnHandle(3);

    fn service_range() -> HandleRange {
        HandleRange {
            start: AttrHandle(10),
            end: AttrHandle(20),
        }
    }

    fn chr_info() -> CharacteristicInfo {
        CharacteristicInfo {
            def_handle: AttrHandle(11),
            value_handle: AttrHandle(12),
            properties: 0x08,
            uuid: CHR,
        }
    }

    fn resolved_service() -> DiscoveryCursor {
        let mut cursor = DiscoveryCursor::services(C, SVC);
        cursor.apply(&RadioEvent::ServiceResult {
            conn: C,
            range: service_range(),
            uuid: SVC,
        });
        assert_eq!(
            cursor.apply(&RadioEvent::ServiceDone { conn: C, status: 0 }),
            Step::Completed
        );
        cursor
    }

    #[test]
    fn service_then_characteristic() {
        let mut cursor = resolved_service();
        assert_eq!(cursor.phase(), DiscoveryPhase::ServicesDone(service_range()));

        assert_eq!(cursor.begin_characteristics(CHR), Ok(service_range()));
        assert_eq!(
            cursor.apply(&RadioEvent::CharacteristicResult {
                conn: C,
                info: chr_info()
            }),
            Step::Recorded
        );
        assert_eq!(
            cursor.apply(&RadioEvent::CharacteristicDone { conn: C, status: 0 }),
            Step::Completed
        );
        assert_eq!(cursor.characteristic(), Some(chr_info()));
    }

    #[test]
    fn non_zero_status_fails() {
        let mut cursor = DiscoveryCursor::services(C, SVC);
        cursor.apply(&RadioEvent::ServiceResult {
            conn: C,
            range: service_range(),
            uuid: SVC,
        });
        assert_eq!(
            cursor.apply(&RadioEvent::ServiceDone {
                conn: C,
                status: 0x0105
            }),
            Step::Failed(DiscoveryError::Status(0x0105))
        );
        assert!(cursor.is_failed());
        assert_eq!(cursor.begin_characteristics(CHR), Err(Error::NoDiscovery));
    }

    #[test]
    fn missing_uuid_is_not_found() {
        let mut cursor = DiscoveryCursor::services(C, SVC);
        cursor.apply(&RadioEvent::ServiceResult {
            conn: C,
            range: service_range(),
            uuid: Uuid::Uuid16(0x1800),
        });
        assert_eq!(
            cursor.apply(&RadioEvent::ServiceDone { conn: C, status: 0 }),
            Step::Failed(DiscoveryError::NotFound)
        );
    }

    #[test]
    fn other_connection_is_ignored() {
        let mut cursor = resolved_service();
        cursor.begin_characteristics(CHR).unwrap();
        let stale = RadioEvent::CharacteristicDone {
            conn: ConnHandle(9),
            status: 0,
        };
        assert_eq!(cursor.apply(&stale), Step::Ignored);
        assert!(matches!(
            cursor.phase(),
            DiscoveryPhase::Characteristics { found: None, .. }
        ));
    }

    #[test]
    fn done_for_another_phase_is_ignored() {
        let mut cursor = resolved_service();
        assert_eq!(
            cursor.apply(&RadioEvent::DescriptorDone { conn: C, status: 0 }),
            Step::Ignored
        );
    }

    #[test]
    fn descriptors_after_characteristic() {
        let mut cursor = resolved_service();
        cursor.begin_characteristics(CHR).unwrap();
        cursor.apply(&RadioEvent::CharacteristicResult {
            conn: C,
            info: chr_info(),
        });
        cursor.apply(&RadioEvent::CharacteristicDone { conn: C, status: 0 });

        let range = cursor.begin_descriptors().unwrap();
        assert_eq!(range.start, AttrHandle(13));
        assert_eq!(range.end, AttrHandle(20));

        cursor.apply(&RadioEvent::DescriptorResult {
            conn: C,
            handle: AttrHandle(13),
            uuid: CCCD_UUID,
        });
        assert_eq!(
            cursor.apply(&RadioEvent::DescriptorDone { conn: C, status: 0 }),
            Step::Completed
        );
        assert_eq!(
            cursor.phase(),
            DiscoveryPhase::DescriptorsDone {
                characteristic: chr_info(),
                cccd: Some(AttrHandle(13)),
            }
        );
    }

    #[test]
    fn descriptors_need_a_characteristic() {
        let mut cursor = resolved_service();
        assert_eq!(cursor.begin_descriptors(), Err(Error::NoDiscovery));
    }
}
