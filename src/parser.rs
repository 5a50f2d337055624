//! Fixed-width BCMS report parsing.
//!
//! Every report type shares one template: header fields on lines 2-4 and
//! interval rows in three bands (lines 10-18, 32-40, then 54 onward). Only
//! the column table of a row and the length of the last band differ, so a
//! single parser drives a per-type [`RecordRow`] implementation.

use std::ops::Range;

use crate::clock::{interval_start, report_timestamp};
use crate::error::{ParseError, ParseResult};
use crate::extract::{self, Line};
use crate::models::{
    AgentRecord, Records, Report, ReportType, SplitRecord, TrunkRecord, VdnRecord,
};

const SWITCH_LINE: usize = 2;
const NUMBER_LINE: usize = 3;
const NAME_LINE: usize = 4;

const SWITCH_NAME: Range<usize> = 13..44;
const TIME_OF_DAY: Range<usize> = 52..60;
const DATE_STAMP: Range<usize> = 66..78;
const NUMBER: Range<usize> = 13..44;
const NAME: Range<usize> = 13..45;
const HEADER_COUNT: Range<usize> = 74..78;

const INTERVAL_LABEL: Range<usize> = 0..11;
const LEADING_BANDS: [Range<usize>; 2] = [10..19, 32..41];
const SHORT_TAIL: Range<usize> = 54..57;
const LONG_TAIL: Range<usize> = 54..60;

/// Which value, if any, sits in the header count column on line 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCount {
    ServiceLevel,
    Trunks,
    Absent,
}

/// Column layout and constructor for one report type's interval rows.
pub trait RecordRow: Sized {
    const KIND: ReportType;
    const HEADER_COUNT: HeaderCount;
    const TAIL_BAND: Range<usize>;

    /// Builds a record from a data line whose interval starts at `time`.
    fn from_line(line: &Line<'_>, time: i64) -> ParseResult<Self>;

    fn collect(rows: Vec<Self>) -> Records;
}

impl RecordRow for SplitRecord {
    const KIND: ReportType = ReportType::Split;
    const HEADER_COUNT: HeaderCount = HeaderCount::ServiceLevel;
    const TAIL_BAND: Range<usize> = LONG_TAIL;

    fn from_line(line: &Line<'_>, time: i64) -> ParseResult<Self> {
        Ok(SplitRecord {
            time,
            acd_calls: line.count(12..17)?,
            avg_speed_ans: line.clock(18..23)?,
            aband_calls: line.count(25..29)?,
            avg_aband_time: line.clock(30..35)?,
            avg_talk_time: line.clock(36..41)?,
            total_after_call: line.clock(42..49)?,
            flow_in: line.count(50..54)?,
            flow_out: line.count(55..59)?,
            total_aux: line.clock(60..67)?,
            avg_staffed: line.ratio(68..73)?,
            in_service_level_percent: line.count(75..78)?,
        })
    }

    fn collect(rows: Vec<Self>) -> Records {
        Records::Split(rows)
    }
}

impl RecordRow for TrunkRecord {
    const KIND: ReportType = ReportType::Trunk;
    const HEADER_COUNT: HeaderCount = HeaderCount::Trunks;
    const TAIL_BAND: Range<usize> = SHORT_TAIL;

    fn from_line(line: &Line<'_>, time: i64) -> ParseResult<Self> {
        Ok(TrunkRecord {
            time,
            incoming_calls: line.count(12..17)?,
            incoming_aband: line.count(18..23)?,
            incoming_time: line.clock(24..30)?,
            incoming_ccs: line.ratio(31..39)?,
            outgoing_calls: line.count(40..45)?,
            outgoing_comp: line.count(46..51)?,
            outgoing_time: line.clock(52..58)?,
            outgoing_ccs: line.ratio(59..67)?,
            all_busy_percent: line.count(69..72)?,
            time_maint_percent: line.count(75..78)?,
        })
    }

    fn collect(rows: Vec<Self>) -> Records {
        Records::Trunk(rows)
    }
}

impl RecordRow for AgentRecord {
    const KIND: ReportType = ReportType::Agent;
    const HEADER_COUNT: HeaderCount = HeaderCount::Absent;
    const TAIL_BAND: Range<usize> = SHORT_TAIL;

    fn from_line(line: &Line<'_>, time: i64) -> ParseResult<Self> {
        Ok(AgentRecord {
            time,
            acd_calls: line.count(12..17)?,
            avg_talk_time: line.clock(18..24)?,
            total_after_call: line.clock(25..32)?,
            total_avail_time: line.clock(33..40)?,
            total_aux_other: line.clock(41..48)?,
            extn_calls: line.count(49..54)?,
            avg_extn_time: line.clock(55..61)?,
            total_time_staffed: line.clock(62..69)?,
            total_hold_time: line.clock(70..77)?,
        })
    }

    fn collect(rows: Vec<Self>) -> Records {
        Records::Agent(rows)
    }
}

impl RecordRow for VdnRecord {
    const KIND: ReportType = ReportType::Vdn;
    const HEADER_COUNT: HeaderCount = HeaderCount::ServiceLevel;
    const TAIL_BAND: Range<usize> = LONG_TAIL;

    fn from_line(line: &Line<'_>, time: i64) -> ParseResult<Self> {
        Ok(VdnRecord {
            time,
            calls_offered: line.count(13..19)?,
            acd_calls: line.count(20..25)?,
            avg_speed_ans: line.clock(26..31)?,
            aband_calls: line.count(32..37)?,
            avg_aband_time: line.clock(38..43)?,
            avg_talk_hold: line.clock(44..49)?,
            conn_calls: line.count(50..56)?,
            flow_out: line.count(57..62)?,
            busy_disc: line.count(63..68)?,
            in_serv_lvl_percent: line.count(70..73)?,
        })
    }

    fn collect(rows: Vec<Self>) -> Records {
        Records::Vdn(rows)
    }
}

/// Parses the raw contents of a file as a report of type `kind`.
pub fn parse_report<T>(kind: ReportType, file_name: &str, text: &T) -> ParseResult<Report>
where
    T: AsRef<[u8]> + ?Sized,
{
    let text = text.as_ref();
    match kind {
        ReportType::Split => parse::<SplitRecord>(file_name, text),
        ReportType::Trunk => parse::<TrunkRecord>(file_name, text),
        ReportType::Agent => parse::<AgentRecord>(file_name, text),
        ReportType::Vdn => parse::<VdnRecord>(file_name, text),
    }
}

pub fn parse<R: RecordRow>(file_name: &str, text: &[u8]) -> ParseResult<Report> {
    if !R::KIND.matches(file_name) {
        return Err(ParseError::WrongType {
            file: file_name.to_string(),
            expected: R::KIND.as_str(),
        });
    }

    let lines = extract::lines(text);
    let switch_line = extract::line_at(&lines, SWITCH_LINE)?;
    let number_line = extract::line_at(&lines, NUMBER_LINE)?;
    let name_line = extract::line_at(&lines, NAME_LINE)?;

    let date_stamp = switch_line.field(DATE_STAMP)?;
    let time_stamp = report_timestamp(&date_stamp, &switch_line.field(TIME_OF_DAY)?)?;

    let (service_level, trunks) = match R::HEADER_COUNT {
        HeaderCount::ServiceLevel => (name_line.required(HEADER_COUNT, "service level")?, 0),
        HeaderCount::Trunks => (0, name_line.required(HEADER_COUNT, "trunk count")?),
        HeaderCount::Absent => (0, 0),
    };

    let bands = LEADING_BANDS.into_iter().chain(std::iter::once(R::TAIL_BAND));
    let mut rows = Vec::new();
    for index in bands.flatten() {
        let line = extract::line_at(&lines, index)?;
        let time = interval_start(&date_stamp, &line.field(INTERVAL_LABEL)?, index)?;
        rows.push(R::from_line(&line, time)?);
    }

    Ok(Report {
        file_name: file_name.to_string(),
        switch_name: switch_line.field(SWITCH_NAME)?.into_owned(),
        number: number_line.required(NUMBER, "number")?,
        name: name_line.field(NAME)?.into_owned(),
        service_level,
        trunks,
        date_stamp: date_stamp.into_owned(),
        time_stamp,
        records: R::collect(rows),
    })
}
