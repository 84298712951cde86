//! Status labels and the human-readable status snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a repair process.
///
/// ```text
/// INITIALIZING → DETECTING-PROBLEMS → ANALYZING-PROBLEMS → PLANNING-REPAIR
///   → PENDING-APPROVAL → APPROVED → PENDING-REPAIR → PENDING-REPORT → REPORT-COMPLETED
///                      ↘ REJECTED
///   ↘ NO-REPAIR-NEEDED
/// ```
///
/// The proactive loop adds WAITING-FOR-NEXT-CYCLE between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RepairStatus {
    Initializing,
    DetectingProblems,
    NoRepairNeeded,
    AnalyzingProblems,
    PlanningRepair,
    PendingApproval,
    Rejected,
    Approved,
    PendingRepair,
    PendingReport,
    ReportCompleted,
    WaitingForNextCycle,
    /// A phase failed (activity retries exhausted, malformed response,
    /// approval timeout under the `fail` policy).
    Failed,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::DetectingProblems => "DETECTING-PROBLEMS",
            Self::NoRepairNeeded => "NO-REPAIR-NEEDED",
            Self::AnalyzingProblems => "ANALYZING-PROBLEMS",
            Self::PlanningRepair => "PLANNING-REPAIR",
            Self::PendingApproval => "PENDING-APPROVAL",
            Self::Rejected => "REJECTED",
            Self::Approved => "APPROVED",
            Self::PendingRepair => "PENDING-REPAIR",
            Self::PendingReport => "PENDING-REPORT",
            Self::ReportCompleted => "REPORT-COMPLETED",
            Self::WaitingForNextCycle => "WAITING-FOR-NEXT-CYCLE",
            Self::Failed => "FAILED",
        }
    }

    /// Terminal for a single cycle (the base run ends here).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoRepairNeeded | Self::Rejected | Self::ReportCompleted | Self::Failed
        )
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published after every phase transition for external observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: RepairStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    pub updated_at: DateTime<Utc>,
    pub planned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_summary: Option<String>,
    /// Planning report link while planned, repair report link once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_link: Option<String>,
}

impl StatusSnapshot {
    pub fn to_markdown(&self) -> String {
        let mut details = format!("## Workflow Status \n\n- **Phase:** {}\n", self.phase);
        if let Some(iteration) = self.iteration {
            details.push_str(&format!("- **Iteration:** {iteration}\n"));
        }
        details.push_str(&format!(
            "- **Last Status Set:** {}\n",
            self.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        let link = self.report_link.as_deref().unwrap_or_default();
        if self.phase == RepairStatus::ReportCompleted {
            details.push_str("- **Repairs Complete:** \n");
            details.push_str(&format!(
                "- **Report Summary:** {}\n",
                self.report_summary.as_deref().unwrap_or("No summary available")
            ));
            details.push_str(&format!("- See [Repairs Report]({link})\n"));
        } else if self.planned {
            details.push_str(&format!("- **Repair Planned:** {}\n", self.planned));
            details.push_str(&format!("- See [Planned Repairs]({link})\n"));
        }
        details
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_markdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(phase: RepairStatus, planned: bool) -> StatusSnapshot {
        StatusSnapshot {
            phase,
            iteration: None,
            updated_at: Utc.with_ymd_and_hms(2025, 6, 28, 12, 0, 0).unwrap(),
            planned,
            report_summary: None,
            report_link: Some("file://reports/planning_report.md".to_string()),
        }
    }

    #[test]
    fn test_status_labels_match_serde() {
        for status in [
            RepairStatus::Initializing,
            RepairStatus::NoRepairNeeded,
            RepairStatus::PendingApproval,
            RepairStatus::ReportCompleted,
            RepairStatus::WaitingForNextCycle,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RepairStatus::NoRepairNeeded.is_terminal());
        assert!(RepairStatus::Rejected.is_terminal());
        assert!(RepairStatus::ReportCompleted.is_terminal());
        assert!(!RepairStatus::PendingApproval.is_terminal());
        assert!(!RepairStatus::WaitingForNextCycle.is_terminal());
    }

    #[test]
    fn test_markdown_planned() {
        let md = snapshot(RepairStatus::PendingApproval, true).to_markdown();
        assert!(md.starts_with("## Workflow Status"));
        assert!(md.contains("- **Phase:** PENDING-APPROVAL\n"));
        assert!(md.contains("- **Last Status Set:** 2025-06-28T12:00:00.000Z\n"));
        assert!(md.contains("- **Repair Planned:** true\n"));
        assert!(md.contains("(file://reports/planning_report.md)"));
        assert!(!md.contains("Iteration"));
    }

    #[test]
    fn test_markdown_completed_with_iteration() {
        let mut snap = snapshot(RepairStatus::ReportCompleted, true);
        snap.iteration = Some(3);
        snap.report_summary = Some("2 orders repaired".to_string());
        let md = snap.to_markdown();
        assert!(md.contains("- **Iteration:** 3\n"));
        assert!(md.contains("- **Report Summary:** 2 orders repaired\n"));
        assert!(md.contains("Repairs Report"));
        assert!(!md.contains("Repair Planned"));
    }

    #[test]
    fn test_markdown_before_planning_has_no_links() {
        let md = snapshot(RepairStatus::DetectingProblems, false).to_markdown();
        assert!(!md.contains("See ["));
    }
}
