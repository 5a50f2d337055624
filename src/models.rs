use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Split,
    Trunk,
    Agent,
    Vdn,
}

impl ReportType {
    /// Dispatch order when matching file names.
    pub const ALL: [ReportType; 4] = [
        ReportType::Split,
        ReportType::Trunk,
        ReportType::Agent,
        ReportType::Vdn,
    ];

    /// Substring that marks a file as this report type.
    pub fn marker(self) -> &'static str {
        match self {
            ReportType::Split => "bcms_sp",
            ReportType::Trunk => "bcms_tru",
            ReportType::Agent => "bcms_ag_",
            ReportType::Vdn => "bcms_vdn_",
        }
    }

    /// Whether `file_name` should be ingested as this type. Daily VDN
    /// rollups are not interval reports and never match.
    pub fn matches(self, file_name: &str) -> bool {
        if !file_name.contains(self.marker()) {
            return false;
        }
        !(self == ReportType::Vdn && file_name.contains("day"))
    }

    /// First type whose marker appears in `file_name`.
    pub fn for_file(file_name: &str) -> Option<ReportType> {
        Self::ALL.into_iter().find(|kind| kind.matches(file_name))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Split => "Split",
            ReportType::Trunk => "Trunk",
            ReportType::Agent => "Agent",
            ReportType::Vdn => "VDN",
        }
    }

    pub fn records_table(self) -> &'static str {
        match self {
            ReportType::Split => "splitreportrecords",
            ReportType::Trunk => "trunkreportrecords",
            ReportType::Agent => "agentreportrecords",
            ReportType::Vdn => "vdnreportrecords",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed report file.
#[derive(Debug, Clone)]
pub struct Report {
    pub file_name: String,
    pub switch_name: String,
    pub number: i32,
    pub name: String,
    /// Split and VDN reports only.
    pub service_level: i32,
    /// Trunk reports only.
    pub trunks: i32,
    pub date_stamp: String,
    pub time_stamp: i64,
    pub records: Records,
}

impl Report {
    pub fn report_type(&self) -> ReportType {
        self.records.report_type()
    }
}

/// Interval rows of a report; one variant per report type so rows are never
/// mixed.
#[derive(Debug, Clone)]
pub enum Records {
    Split(Vec<SplitRecord>),
    Trunk(Vec<TrunkRecord>),
    Agent(Vec<AgentRecord>),
    Vdn(Vec<VdnRecord>),
}

impl Records {
    pub fn report_type(&self) -> ReportType {
        match self {
            Records::Split(_) => ReportType::Split,
            Records::Trunk(_) => ReportType::Trunk,
            Records::Agent(_) => ReportType::Agent,
            Records::Vdn(_) => ReportType::Vdn,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Records::Split(rows) => rows.len(),
            Records::Trunk(rows) => rows.len(),
            Records::Agent(rows) => rows.len(),
            Records::Vdn(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Durations are whole seconds; `time` is the interval start in epoch seconds.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitRecord {
    pub time: i64,
    pub acd_calls: i32,
    pub avg_speed_ans: i32,
    pub aband_calls: i32,
    pub avg_aband_time: i32,
    pub avg_talk_time: i32,
    pub total_after_call: i32,
    pub flow_in: i32,
    pub flow_out: i32,
    pub total_aux: i32,
    pub avg_staffed: f64,
    pub in_service_level_percent: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrunkRecord {
    pub time: i64,
    pub incoming_calls: i32,
    pub incoming_aband: i32,
    pub incoming_time: i32,
    pub incoming_ccs: f64,
    pub outgoing_calls: i32,
    pub outgoing_comp: i32,
    pub outgoing_time: i32,
    pub outgoing_ccs: f64,
    pub all_busy_percent: i32,
    pub time_maint_percent: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub time: i64,
    pub acd_calls: i32,
    pub avg_talk_time: i32,
    pub total_after_call: i32,
    pub total_avail_time: i32,
    pub total_aux_other: i32,
    pub extn_calls: i32,
    pub avg_extn_time: i32,
    pub total_time_staffed: i32,
    pub total_hold_time: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VdnRecord {
    pub time: i64,
    pub calls_offered: i32,
    pub acd_calls: i32,
    pub avg_speed_ans: i32,
    pub aband_calls: i32,
    pub avg_aband_time: i32,
    pub avg_talk_hold: i32,
    pub conn_calls: i32,
    pub flow_out: i32,
    pub busy_disc: i32,
    pub in_serv_lvl_percent: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_files_route_only_to_split() {
        assert_eq!(ReportType::for_file("bcms_sp001.txt"), Some(ReportType::Split));
        assert!(!ReportType::Trunk.matches("bcms_sp001.txt"));
        assert!(!ReportType::Agent.matches("bcms_sp001.txt"));
        assert!(!ReportType::Vdn.matches("bcms_sp001.txt"));
    }

    #[test]
    fn each_marker_selects_its_type() {
        assert_eq!(ReportType::for_file("bcms_tru12.txt"), Some(ReportType::Trunk));
        assert_eq!(ReportType::for_file("bcms_ag_3401.txt"), Some(ReportType::Agent));
        assert_eq!(ReportType::for_file("bcms_vdn_5000.txt"), Some(ReportType::Vdn));
    }

    #[test]
    fn daily_vdn_rollups_are_skipped() {
        assert_eq!(ReportType::for_file("bcms_vdn_day01.txt"), None);
    }

    #[test]
    fn unknown_and_case_mismatched_names_are_skipped() {
        assert_eq!(ReportType::for_file("readme.txt"), None);
        assert_eq!(ReportType::for_file("BCMS_SP001.TXT"), None);
    }
}
