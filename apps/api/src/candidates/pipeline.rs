//! Application pipeline states and the transitions allowed between them.

use serde::{Deserialize, Serialize};

use crate::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Applied,
    Screening,
    Screened,
    Interviewing,
    Interviewed,
    Offered,
    Hired,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Screening => "screening",
            ApplicationStatus::Screened => "screened",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::Interviewed => "interviewed",
            ApplicationStatus::Offered => "offered",
            ApplicationStatus::Hired => "hired",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "applied" => ApplicationStatus::Applied,
            "screening" => ApplicationStatus::Screening,
            "screened" => ApplicationStatus::Screened,
            "interviewing" => ApplicationStatus::Interviewing,
            "interviewed" => ApplicationStatus::Interviewed,
            "offered" => ApplicationStatus::Offered,
            "hired" => ApplicationStatus::Hired,
            "rejected" => ApplicationStatus::Rejected,
            "withdrawn" => ApplicationStatus::Withdrawn,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Hired | ApplicationStatus::Rejected | ApplicationStatus::Withdrawn
        )
    }

    /// Forward moves along the pipeline plus reject/withdraw from any live state.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;

        if self.is_terminal() || *self == next {
            return false;
        }
        if matches!(next, Rejected | Withdrawn) {
            return true;
        }
        matches!(
            (self, next),
            (Applied, Screening)
                | (Screening, Screened)
                | (Screened, Interviewing)
                | (Interviewing, Interviewed)
                | (Interviewed, Offered)
                | (Offered, Hired)
        )
    }
}

/// Candidates may only withdraw; employers and admins drive everything else.
pub fn role_may_set(role: Role, next: ApplicationStatus) -> bool {
    match role {
        Role::Candidate => next == ApplicationStatus::Withdrawn,
        Role::Employer => next != ApplicationStatus::Withdrawn,
        Role::Admin => true,
    }
}
