//! Guest validation: face + plate samples in, an entry decision out.
//!
//! Recognition itself is opaque to the service. `PlateReader` and
//! `FaceMatcher` are the seams where a real OCR or face model plugs in; the
//! shipped implementations treat the plate sample as already-recognised text
//! and compare face samples by digest.

pub mod matchers;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_common::Plate;

use crate::db::store::{Store, StoreError};

pub use matchers::{DigestFaceMatcher, TextPlateReader};

/// Turns a plate sample into a canonical plate.
pub trait PlateReader: Send + Sync {
    fn read_plate(&self, sample: &[u8]) -> Option<Plate>;
}

/// Decides whether a face sample matches an enrolled reference.
pub trait FaceMatcher: Send + Sync {
    /// Reference stored at enrolment time for `sample`.
    fn enroll(&self, sample: &[u8]) -> String;
    fn matches(&self, sample: &[u8], reference: &str) -> bool;
}

/// A successful guest match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestMatch {
    pub resident_id: i64,
    pub guest_id: i64,
    pub plate: Plate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMatch {
    /// A pending guest. Triggers an arrival notification.
    Guest(GuestMatch),
    /// A resident's own car.
    Resident { resident_id: i64, plate: Plate },
}

/// Why entry was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoMatch {
    UnreadablePlate,
    UnknownPlate(Plate),
    FaceMismatch { plate: Plate, guest_id: i64 },
    ResidentFaceMismatch { plate: Plate, resident_id: i64 },
    /// The guest's invitation window has not opened yet.
    InvitationNotStarted {
        plate: Plate,
        guest_id: i64,
        starts_at: DateTime<Utc>,
    },
}

impl NoMatch {
    pub fn reason(&self) -> &'static str {
        match self {
            NoMatch::UnreadablePlate => "plate_unreadable",
            NoMatch::UnknownPlate(_) => "no_match",
            NoMatch::FaceMismatch { .. } | NoMatch::ResidentFaceMismatch { .. } => "face_mismatch",
            NoMatch::InvitationNotStarted { .. } => "invitation_not_started",
        }
    }

    pub fn plate(&self) -> Option<&Plate> {
        match self {
            NoMatch::UnreadablePlate => None,
            NoMatch::UnknownPlate(plate)
            | NoMatch::FaceMismatch { plate, .. }
            | NoMatch::ResidentFaceMismatch { plate, .. }
            | NoMatch::InvitationNotStarted { plate, .. } => Some(plate),
        }
    }
}

impl fmt::Display for NoMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatch::UnreadablePlate => f.write_str("license plate could not be read"),
            NoMatch::UnknownPlate(plate) => {
                write!(f, "plate {plate} does not match any resident or pending guest")
            }
            NoMatch::FaceMismatch { plate, .. } => {
                write!(f, "face does not match the guest registered for plate {plate}")
            }
            NoMatch::ResidentFaceMismatch { plate, .. } => {
                write!(f, "face does not match the resident owning plate {plate}")
            }
            NoMatch::InvitationNotStarted { plate, starts_at, .. } => {
                write!(f, "invitation for plate {plate} starts at {starts_at}")
            }
        }
    }
}

#[derive(Debug)]
pub enum OracleError {
    NoMatch(NoMatch),
    Store(StoreError),
}

impl From<NoMatch> for OracleError {
    fn from(no_match: NoMatch) -> Self {
        OracleError::NoMatch(no_match)
    }
}

impl From<StoreError> for OracleError {
    fn from(err: StoreError) -> Self {
        OracleError::Store(err)
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::NoMatch(no_match) => no_match.fmt(f),
            OracleError::Store(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for OracleError {}

#[async_trait]
pub trait GuestValidationOracle: Send + Sync {
    /// Reference to store with a guest so a later `validate` can match it.
    fn enroll_face(&self, sample: &[u8]) -> String;

    async fn validate(&self, face_sample: &[u8], plate_sample: &[u8]) -> Result<EntryMatch, OracleError>;
}

/// Matches samples against the cars and pending guests in a `Store`.
///
/// A plate grants entry when it belongs to a resident's car or to a pending
/// guest whose invitation has started. Either way, if the owner has an
/// enrolled face, the face sample must match it.
pub struct StoreOracle<P = TextPlateReader, F = DigestFaceMatcher> {
    store: Arc<dyn Store>,
    plates: P,
    faces: F,
}

impl StoreOracle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_matchers(store, TextPlateReader, DigestFaceMatcher)
    }
}

impl<P: PlateReader, F: FaceMatcher> StoreOracle<P, F> {
    pub fn with_matchers(store: Arc<dyn Store>, plates: P, faces: F) -> Self {
        Self {
            store,
            plates,
            faces,
        }
    }
}

#[async_trait]
impl<P: PlateReader, F: FaceMatcher> GuestValidationOracle for StoreOracle<P, F> {
    fn enroll_face(&self, sample: &[u8]) -> String {
        self.faces.enroll(sample)
    }

    async fn validate(&self, face_sample: &[u8], plate_sample: &[u8]) -> Result<EntryMatch, OracleError> {
        let plate = self
            .plates
            .read_plate(plate_sample)
            .ok_or(NoMatch::UnreadablePlate)?;

        if let Some(car) = self.store.car_by_plate(plate.as_str()).await? {
            let enrolled = self
                .store
                .user_by_id(car.resident_id)
                .await?
                .and_then(|resident| resident.face_ref);
            if let Some(ref reference) = enrolled {
                if !self.faces.matches(face_sample, reference) {
                    return Err(NoMatch::ResidentFaceMismatch {
                        plate,
                        resident_id: car.resident_id,
                    }
                    .into());
                }
            }
            return Ok(EntryMatch::Resident {
                resident_id: car.resident_id,
                plate,
            });
        }

        let guest = match self.store.pending_guest_by_plate(plate.as_str()).await? {
            Some(guest) => guest,
            None => return Err(NoMatch::UnknownPlate(plate).into()),
        };

        if let Some(starts_at) = guest.invitation_start.filter(|start| *start > Utc::now()) {
            return Err(NoMatch::InvitationNotStarted {
                plate,
                guest_id: guest.id,
                starts_at,
            }
            .into());
        }

        if let Some(ref reference) = guest.face_ref {
            if !self.faces.matches(face_sample, reference) {
                return Err(NoMatch::FaceMismatch {
                    plate,
                    guest_id: guest.id,
                }
                .into());
            }
        }

        Ok(EntryMatch::Guest(GuestMatch {
            resident_id: guest.resident_id,
            guest_id: guest.id,
            plate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::car::Car;
    use crate::models::guest::{Guest, GuestStatus};
    use crate::models::user::{Role, User};
    use chrono::Duration;

    async fn seeded() -> (Arc<MemoryStore>, StoreOracle) {
        let store = Arc::new(MemoryStore::new());
        let resident = User {
            id: 42,
            name: "Resident".into(),
            email: "r@example.com".into(),
            role: Role::Resident,
            password_hash: "x".into(),
            face_ref: None,
            created_at: Utc::now(),
        };
        let car = Car {
            id: 1,
            resident_id: 42,
            license_plate: "HOME1".into(),
            created_at: Utc::now(),
        };
        store.insert_user(resident, Some(car)).await.unwrap();

        let guest = |id, plate: &str, face_ref: Option<String>| Guest {
            id,
            resident_id: 42,
            license_plate: plate.into(),
            face_ref,
            invitation_start: None,
            status: GuestStatus::Pending,
            arrival_time: None,
            created_at: Utc::now(),
        };
        store.insert_guest(guest(100, "ABC123", None)).await.unwrap();
        let face_ref = DigestFaceMatcher.enroll(b"guest-face");
        store.insert_guest(guest(101, "FACE1", Some(face_ref))).await.unwrap();
        store
            .insert_guest(Guest {
                invitation_start: Some(Utc::now() + Duration::hours(2)),
                ..guest(102, "LATER1", None)
            })
            .await
            .unwrap();
        store
            .insert_guest(Guest {
                invitation_start: Some(Utc::now() - Duration::hours(2)),
                ..guest(103, "EARLIER1", None)
            })
            .await
            .unwrap();

        let oracle = StoreOracle::new(store.clone());
        (store, oracle)
    }

    #[tokio::test]
    async fn guest_plate_matches_with_normalisation() {
        let (_, oracle) = seeded().await;
        let got = oracle.validate(b"", b"abc-123").await.unwrap();
        assert_eq!(
            got,
            EntryMatch::Guest(GuestMatch {
                resident_id: 42,
                guest_id: 100,
                plate: Plate::parse("ABC123").unwrap(),
            })
        );
    }

    #[tokio::test]
    async fn resident_car_is_recognised() {
        let (_, oracle) = seeded().await;
        let got = oracle.validate(b"", b"home 1").await.unwrap();
        assert!(matches!(got, EntryMatch::Resident { resident_id: 42, .. }));
    }

    #[tokio::test]
    async fn enrolled_face_must_match() {
        let (_, oracle) = seeded().await;
        let err = oracle.validate(b"someone-else", b"FACE1").await.unwrap_err();
        assert!(matches!(
            err,
            OracleError::NoMatch(NoMatch::FaceMismatch { guest_id: 101, .. })
        ));

        let ok = oracle.validate(b"guest-face", b"FACE1").await.unwrap();
        assert!(matches!(ok, EntryMatch::Guest(GuestMatch { guest_id: 101, .. })));
    }

    #[tokio::test]
    async fn unknown_and_unreadable_plates() {
        let (_, oracle) = seeded().await;
        let err = oracle.validate(b"", b"ZZZ999").await.unwrap_err();
        assert!(matches!(err, OracleError::NoMatch(NoMatch::UnknownPlate(_))));

        let err = oracle.validate(b"", &[0xff, 0xfe]).await.unwrap_err();
        assert!(matches!(err, OracleError::NoMatch(NoMatch::UnreadablePlate)));
    }

    #[tokio::test]
    async fn admitted_guest_no_longer_matches() {
        let (store, oracle) = seeded().await;
        store.mark_guest_arrived(100, Utc::now()).await.unwrap();
        let err = oracle.validate(b"", b"ABC123").await.unwrap_err();
        assert!(matches!(err, OracleError::NoMatch(NoMatch::UnknownPlate(_))));
    }

    #[tokio::test]
    async fn resident_with_enrolled_face_must_match() {
        let (store, oracle) = seeded().await;
        let reference = oracle.enroll_face(b"resident-face");
        store.set_user_face(42, &reference).await.unwrap();

        let err = oracle.validate(b"someone-else", b"HOME1").await.unwrap_err();
        assert!(matches!(
            err,
            OracleError::NoMatch(NoMatch::ResidentFaceMismatch { resident_id: 42, .. })
        ));
        if let OracleError::NoMatch(no_match) = err {
            assert_eq!(no_match.reason(), "face_mismatch");
        }

        let ok = oracle.validate(b"resident-face", b"HOME1").await.unwrap();
        assert!(matches!(ok, EntryMatch::Resident { resident_id: 42, .. }));
    }

    #[tokio::test]
    async fn guest_is_refused_before_invitation_starts() {
        let (_, oracle) = seeded().await;
        let err = oracle.validate(b"", b"LATER1").await.unwrap_err();
        match err {
            OracleError::NoMatch(no_match) => {
                assert_eq!(no_match.reason(), "invitation_not_started");
                assert!(matches!(no_match, NoMatch::InvitationNotStarted { guest_id: 102, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        let ok = oracle.validate(b"", b"EARLIER1").await.unwrap();
        assert!(matches!(ok, EntryMatch::Guest(GuestMatch { guest_id: 103, .. })));
    }
}
