//! Capacity reservations (§3): a forward-looking lock on (project,
//! flavor, host). Phase transitions are monotonic: pending → active →
//! consumed or expired. An active reservation whose (project, flavor)
//! matches an incoming request "unlocks" that reservation's share of
//! capacity when `FilterHasEnoughCapacity` computes effective
//! allocatable (§4.6, Scenario 3).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use strum::{Display as StrumDisplay, EnumString};
use thiserror::Error;
use uuid::Uuid;

use super::schema::reservations;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
    /// unknown reservation phase {0:?}
    UnknownPhase(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Pending,
    Active,
    Consumed,
    Expired,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reservations)]
pub struct Reservation {
    pub id: Uuid,
    pub project_id: String,
    pub flavor_name: String,
    pub host_name: String,
    pub requested_vcpus: i32,
    pub requested_memory_mb: i32,
    pub phase: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn phase(&self) -> Result<Phase, Error> {
        self.phase
            .parse()
            .map_err(|_| Error::UnknownPhase(self.phase.clone()))
    }

    pub async fn active_for_host(
        host_name: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Vec<Self>, Error> {
        Ok(reservations::table
            .filter(reservations::host_name.eq(host_name))
            .filter(reservations::phase.eq(Phase::Active.to_string()))
            .get_results(conn)
            .await?)
    }

    /// The open question in spec.md §9 ("do multiple matching
    /// reservations unlock cumulatively?") is resolved here: yes — every
    /// active reservation matching `(project, flavor)` on this host has
    /// its requested share subtracted from the locked total, so two
    /// matching reservations both unlock. See DESIGN.md.
    pub fn locked_vcpus(
        active: &[Self],
        requesting_project: &str,
        requesting_flavor: &str,
    ) -> i64 {
        active
            .iter()
            .filter(|r| !(r.project_id == requesting_project && r.flavor_name == requesting_flavor))
            .map(|r| i64::from(r.requested_vcpus))
            .sum()
    }

    pub fn locked_memory_mb(
        active: &[Self],
        requesting_project: &str,
        requesting_flavor: &str,
    ) -> i64 {
        active
            .iter()
            .filter(|r| !(r.project_id == requesting_project && r.flavor_name == requesting_flavor))
            .map(|r| i64::from(r.requested_memory_mb))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reservation(project: &str, flavor: &str, host: &str, vcpus: i32) -> Reservation {
        Reservation {
            id: Uuid::nil(),
            project_id: project.to_string(),
            flavor_name: flavor.to_string(),
            host_name: host.to_string(),
            requested_vcpus: vcpus,
            requested_memory_mb: 0,
            phase: Phase::Active.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn matching_reservation_unlocks_its_own_share() {
        let active = vec![reservation("P", "F", "hostA", 20)];
        assert_eq!(Reservation::locked_vcpus(&active, "P", "F"), 0);
    }

    #[test]
    fn non_matching_reservation_stays_locked() {
        let active = vec![reservation("P", "F", "hostA", 20)];
        assert_eq!(Reservation::locked_vcpus(&active, "Q", "F"), 20);
    }

    #[test]
    fn multiple_matching_reservations_unlock_cumulatively() {
        let active = vec![
            reservation("P", "F", "hostA", 20),
            reservation("P", "F", "hostA", 5),
        ];
        assert_eq!(Reservation::locked_vcpus(&active, "P", "F"), 0);
    }
}
