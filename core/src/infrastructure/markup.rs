// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! Markup extraction for the upstream's HTML responses.
//!
//! Everything in this module is a pure `&str -> record` function. The
//! upstream's page structure is not contractually stable, so "no match" is
//! a normal outcome: extractors return `Option`/empty collections and the
//! callers degrade to partial data instead of failing.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static EXECUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="execution"\s+value="([^"]+)""#).expect("execution pattern"));
static LT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="lt"\s+value="([^"]+)""#).expect("lt pattern"));

static HIDDEN_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="hid_Token"\s+value="([^"]+)""#).expect("hid_Token pattern"));
static LOCAL_STORAGE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"localStorage\.setItem\(['"]token['"]\s*,\s*['"]([^'"]+)['"]"#)
        .expect("localStorage pattern")
});
static WINDOW_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"window\.token\s*=\s*['"]([^'"]+)['"]"#).expect("window pattern"));
static RAW_JWT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[a-zA-Z0-9\-_]+\.[a-zA-Z0-9\-_]+\.[a-zA-Z0-9\-_]+").expect("jwt pattern")
});

static DRAWING_IDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"getLichDangKyByDotDKId\s*\(\s*this\s*,\s*(\d+)\s*,\s*(\d+)")
        .expect("drawing ids pattern")
});

static SESSKEY_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""sesskey"\s*:\s*"([^"]+)""#).expect("sesskey pattern"));
static SESSKEY_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="sesskey"\s+value="([^"]+)""#).expect("sesskey input pattern"));
static USERID_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""userid"\s*:\s*"?(\d+)"?"#).expect("userid pattern"));
static USERID_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-userid="(\d+)""#).expect("data-userid pattern"));

static WINDOW_FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="hdTrongHanDK"\s+value="(\w+)""#).expect("window flag pattern"));
static WINDOW_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}/\d{2}/\d{4}\s+\d{2}:\d{2}").expect("window date pattern"));

static ROUND_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<tr[^>]*onclick="ketQuaDangKyView\((\d+)[^"]*"[^>]*>\s*<td>(\d+)</td>\s*<td[^>]*>([^<]+)</td>\s*<td>(.*?)</td>\s*<td>([^<]+)</td>\s*<td>([^<]+)</td>"#,
    )
    .expect("round row pattern")
});

static RESULT_PANEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<div class='col-md-1'>(\d+)</div>.*?<div class='col-md-8'>(.*?)</div>.*?<div class='col-md-1'>.*?([\d.]+).*?</div>",
    )
    .expect("result panel pattern")
});
static COURSE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]{2}\d{4})\s*-\s*([^<]+)").expect("course code pattern"));
static RESULT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"hieuChinhKetQuaDangKyForm\((\d+)\)|xoaKetQuaDangKy\((\d+)").expect("result id pattern")
});
static TOTAL_CREDITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Tổng số tín chỉ đăng ký:\s*([\d.]+)").expect("credits pattern"));
static TOTAL_COURSES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Tổng số môn đăng ký:\s*(\d+)").expect("courses pattern"));

static SEARCH_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<tr\s+id='monHoc(\d+)'[^>]*onclick='getThongTinNhomLopMonHoc\([^,]+,\s*(\d+)\)'[^>]*>.*?<td class="item_list">(\d+)\s*</td>.*?<td class='item_list'\s*>([A-Z0-9]+)\s*</td>\s*<td class='item_list'\s*>([^<]+)</td>\s*<td class='item_list'\s*>([\d.]+)</td>"#,
    )
    .expect("search row pattern")
});

static HR_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<hr\s*/?>").expect("hr pattern"));
static GROUP_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<tr[^>]*style="border-bottom:2px #ccc\s+solid;"[^>]*>(.*?)</tr>"#)
        .expect("group header pattern")
});
static ITEM_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<td class='item_list'[^>]*>(.*?)</td>").expect("item cell pattern")
});
static SLOTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)/(\d+)").expect("slots pattern"));
static GROUP_BUTTON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"dangKyNhomLopMonHoc\s*\(\s*this\s*,\s*(\d+)\s*,\s*(\d+)\s*\)")
        .expect("group button pattern")
});
static GROUP_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<table[^>]*class=['"]table['"][^>]*>(.*?)</table>"#).expect("group table pattern")
});
static TABLE_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("table row pattern"));
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digits pattern"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));

/// Anti-forgery tokens scraped from the CAS login form.
#[derive(Debug, Clone, PartialEq)]
pub struct CasFormTokens {
    pub execution: String,
    pub lt: String,
}

/// Both hidden fields must be present for the form to be submittable.
pub fn extract_cas_tokens(html: &str) -> Option<CasFormTokens> {
    let execution = EXECUTION_RE.captures(html)?.get(1)?.as_str().to_string();
    let lt = LT_RE.captures(html)?.get(1)?.as_str().to_string();
    Some(CasFormTokens { execution, lt })
}

/// Scan a post-login page for an embedded bearer token.
///
/// Tries, in order: the `hid_Token` hidden input, a `localStorage.setItem`
/// assignment, a `window.token` assignment, and finally a raw JWT literal.
/// Returns the value with the `Bearer ` prefix already applied.
pub fn extract_bearer_token(html: &str) -> Option<String> {
    let token = HIDDEN_TOKEN_RE
        .captures(html)
        .or_else(|| LOCAL_STORAGE_TOKEN_RE.captures(html))
        .or_else(|| WINDOW_TOKEN_RE.captures(html))
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
        .or_else(|| RAW_JWT_RE.find(html).map(|m| m.as_str().to_string()))?;
    Some(format!("Bearer {token}"))
}

/// Drawing-round addressing pair resolved from the drawing-list response.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingIds {
    /// `dotDKHocVienId` — the per-student owner id.
    pub owner_id: String,
    /// `dotDKId` — the drawing-round id.
    pub drawing_id: String,
}

/// Match the inline `getLichDangKyByDotDKId(this, <owner>, <drawing>` call.
pub fn extract_drawing_ids(html: &str) -> Option<DrawingIds> {
    let caps = DRAWING_IDS_RE.captures(html)?;
    Some(DrawingIds {
        owner_id: caps.get(1)?.as_str().to_string(),
        drawing_id: caps.get(2)?.as_str().to_string(),
    })
}

/// Identity scraped from the LMS landing page after the SSO hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct LmsIdentity {
    pub sesskey: String,
    pub userid: Option<String>,
}

pub fn extract_lms_identity(html: &str) -> Option<LmsIdentity> {
    let sesskey = SESSKEY_JSON_RE
        .captures(html)
        .or_else(|| SESSKEY_INPUT_RE.captures(html))?
        .get(1)?
        .as_str()
        .to_string();
    let userid = USERID_JSON_RE
        .captures(html)
        .or_else(|| USERID_DATA_RE.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some(LmsIdentity { sesskey, userid })
}

/// Registration window for a resolved drawing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationWindow {
    pub from: String,
    pub to: String,
    pub is_open: bool,
}

pub fn parse_registration_window(html: &str) -> RegistrationWindow {
    let is_open = WINDOW_FLAG_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str() == "true")
        .unwrap_or(false);
    let mut dates = WINDOW_DATE_RE.find_iter(html).map(|m| m.as_str().to_string());
    RegistrationWindow {
        from: dates.next().unwrap_or_default(),
        to: dates.next().unwrap_or_default(),
        is_open,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Upcoming,
    Open,
    Closed,
}

/// One row of the registration-rounds table on the form page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRound {
    pub id: u64,
    pub stt: u32,
    pub code: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub status: RoundStatus,
    pub has_result: bool,
}

/// Parse the rounds table; `now` determines each round's status.
pub fn parse_registration_rounds(html: &str, now: NaiveDateTime) -> Vec<RegistrationRound> {
    ROUND_ROW_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let start_time = caps.get(5)?.as_str().trim().to_string();
            let end_time = caps.get(6)?.as_str().trim().to_string();
            let start = parse_vietnamese_date(&start_time);
            let end = parse_vietnamese_date(&end_time);

            let status = match (start, end) {
                (Some(s), Some(e)) if now >= s && now <= e => RoundStatus::Open,
                (_, Some(e)) if now > e => RoundStatus::Closed,
                _ => RoundStatus::Upcoming,
            };

            let description_html = caps.get(4)?.as_str();
            Some(RegistrationRound {
                id: caps.get(1)?.as_str().parse().ok()?,
                stt: caps.get(2)?.as_str().parse().ok()?,
                code: caps.get(3)?.as_str().trim().to_string(),
                description: strip_tags(description_html),
                has_result: description_html.to_lowercase().contains("kết quả"),
                start_time,
                end_time,
                status,
            })
        })
        .collect()
}

/// One registered course in the current result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCourse {
    pub stt: u32,
    pub code: String,
    pub name: String,
    pub credits: f64,
    pub ketqua_id: Option<String>,
    pub is_locked: bool,
    pub can_delete: bool,
}

/// The parsed registration result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResults {
    pub courses: Vec<RegisteredCourse>,
    pub total_credits: f64,
    pub total_courses: u32,
}

pub fn parse_registration_results(html: &str) -> RegistrationResults {
    let courses: Vec<RegisteredCourse> = RESULT_PANEL_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let col8 = caps.get(2)?.as_str();
            let course = COURSE_CODE_RE.captures(col8)?;
            let code = course.get(1)?.as_str().trim().to_string();

            let ketqua_id = RESULT_ID_RE.captures(col8).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .map(|m| m.as_str().to_string())
            });

            // The lock icon lives in the course's own section of the page.
            let is_locked = section_after(html, &code).contains("fa-lock");

            Some(RegisteredCourse {
                stt: caps.get(1)?.as_str().parse().ok()?,
                name: course.get(2)?.as_str().trim().to_string(),
                credits: caps.get(3)?.as_str().parse().ok()?,
                can_delete: !is_locked && ketqua_id.is_some(),
                code,
                ketqua_id,
                is_locked,
            })
        })
        .collect();

    let total_credits = TOTAL_CREDITS_RE
        .captures(html)
        .and_then(|c| c.get(1)?.as_str().parse().ok())
        .unwrap_or(0.0);
    let total_courses = TOTAL_COURSES_RE
        .captures(html)
        .and_then(|c| c.get(1)?.as_str().parse().ok())
        .unwrap_or(courses.len() as u32);

    RegistrationResults {
        courses,
        total_credits,
        total_courses,
    }
}

/// One hit in the free-text course search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub mon_hoc_id: String,
    pub nhom_lop_id: String,
    pub stt: u32,
    pub code: String,
    pub name: String,
    pub credits: f64,
}

pub fn parse_search_results(html: &str) -> Vec<SearchHit> {
    SEARCH_ROW_RE
        .captures_iter(html)
        .filter_map(|caps| {
            Some(SearchHit {
                mon_hoc_id: caps.get(1)?.as_str().to_string(),
                nhom_lop_id: caps.get(2)?.as_str().to_string(),
                stt: caps.get(3)?.as_str().parse().ok()?,
                code: caps.get(4)?.as_str().trim().to_string(),
                name: caps.get(5)?.as_str().trim().to_string(),
                credits: caps.get(6)?.as_str().parse().ok()?,
            })
        })
        .collect()
}

/// One weekly meeting of a class group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSchedule {
    pub day: String,
    pub time_slots: String,
    pub room: String,
    pub campus: String,
    pub bttn: String,
    pub weeks: String,
}

/// One registrable class group of a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub group_code: String,
    pub registered: u32,
    pub capacity: u32,
    pub language: String,
    pub lecturer: String,
    pub can_register: bool,
    pub nlmh_id: Option<String>,
    pub mon_hoc_id: Option<String>,
    pub is_full: bool,
    pub schedules: Vec<GroupSchedule>,
}

/// Parse the class-group info page. Sections are separated by `<hr>` tags;
/// each section has a header row (group, slots, action button) and an
/// optional schedule table.
pub fn parse_class_groups(html: &str) -> Vec<ClassGroup> {
    HR_SPLIT_RE
        .split(html)
        .filter_map(parse_class_group_section)
        .collect()
}

fn parse_class_group_section(section: &str) -> Option<ClassGroup> {
    let header = GROUP_HEADER_RE.captures(section)?.get(1)?.as_str();
    let cells: Vec<String> = ITEM_CELL_RE
        .captures_iter(header)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect();
    if cells.len() < 9 {
        return None;
    }

    let slots = SLOTS_RE.captures(&cells[1])?;
    let registered: u32 = slots.get(1)?.as_str().parse().ok()?;
    let capacity: u32 = slots.get(2)?.as_str().parse().ok()?;

    let button = GROUP_BUTTON_RE.captures(&cells[8]);
    let (nlmh_id, mon_hoc_id) = match &button {
        Some(c) => (
            c.get(1).map(|m| m.as_str().to_string()),
            c.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (None, None),
    };

    let schedules = GROUP_TABLE_RE
        .captures(section)
        .and_then(|c| c.get(1).map(|m| parse_group_schedules(m.as_str())))
        .unwrap_or_default();

    Some(ClassGroup {
        group_code: cells[0].clone(),
        registered,
        capacity,
        language: if cells[2].is_empty() {
            "V".to_string()
        } else {
            cells[2].clone()
        },
        lecturer: cells[4].clone(),
        can_register: button.is_some(),
        nlmh_id,
        mon_hoc_id,
        is_full: registered >= capacity,
        schedules,
    })
}

fn parse_group_schedules(table: &str) -> Vec<GroupSchedule> {
    TABLE_ROW_RE
        .captures_iter(table)
        .filter_map(|row| {
            let row = row.get(1)?.as_str();
            // Skip the header row.
            if row.contains("<th") || row.contains("border-bottom:2px") {
                return None;
            }
            let cells: Vec<String> = ITEM_CELL_RE
                .captures_iter(row)
                .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
                .collect();
            if cells.len() < 6 {
                return None;
            }

            let day = strip_tags(&cells[0]);
            let has_time = DIGITS_RE.is_match(&cells[1]);
            if day.is_empty() && !has_time {
                return None;
            }

            let slots: Vec<&str> = DIGITS_RE.find_iter(&cells[1]).map(|m| m.as_str()).collect();
            Some(GroupSchedule {
                day,
                time_slots: if slots.is_empty() {
                    "-".to_string()
                } else {
                    slots.join(", ")
                },
                room: cells[2].clone(),
                campus: cells[3].clone(),
                bttn: cells[4].clone(),
                weeks: strip_tags(&cells[5]),
            })
        })
        .collect()
}

/// Parse the upstream's `DD/MM/YYYY HH:mm` timestamps (time optional).
pub fn parse_vietnamese_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(value, "%d/%m/%Y %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%d/%m/%Y")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").trim().to_string()
}

fn section_after<'a>(html: &'a str, marker: &str) -> &'a str {
    match html.find(marker) {
        Some(idx) => {
            let rest = &html[idx..];
            match rest[1..].find("<div class=\"panel panel-default\">") {
                Some(end) => &rest[..end + 1],
                None => {
                    let mut cut = rest.len().min(4000);
                    while !rest.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    &rest[..cut]
                }
            }
        }
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_tokens_require_both_fields() {
        let html = r#"<input name="execution" value="e1s1"/><input name="lt" value="LT-42"/>"#;
        let tokens = extract_cas_tokens(html).unwrap();
        assert_eq!(tokens.execution, "e1s1");
        assert_eq!(tokens.lt, "LT-42");

        assert!(extract_cas_tokens(r#"<input name="execution" value="e1s1"/>"#).is_none());
        assert!(extract_cas_tokens("<html></html>").is_none());
    }

    #[test]
    fn bearer_token_prefers_hidden_input() {
        let html = r#"
            <input id="hid_Token" value="from-input"/>
            <script>localStorage.setItem('token', 'from-storage')</script>
        "#;
        assert_eq!(extract_bearer_token(html).unwrap(), "Bearer from-input");
    }

    #[test]
    fn bearer_token_falls_back_through_patterns() {
        assert_eq!(
            extract_bearer_token(r#"<script>localStorage.setItem('token', 'ls')</script>"#).unwrap(),
            "Bearer ls"
        );
        assert_eq!(
            extract_bearer_token(r#"<script>window.token = 'w'</script>"#).unwrap(),
            "Bearer w"
        );
        assert_eq!(
            extract_bearer_token("prefix eyJhbGci.eyJzdWIi.c2ln suffix").unwrap(),
            "Bearer eyJhbGci.eyJzdWIi.c2ln"
        );
        assert!(extract_bearer_token("<html>no token here</html>").is_none());
    }

    #[test]
    fn drawing_ids_match_inline_script_call() {
        let html = "<a onclick=\"getLichDangKyByDotDKId(this, 771, 5521)\">round</a>";
        let ids = extract_drawing_ids(html).unwrap();
        assert_eq!(ids.owner_id, "771");
        assert_eq!(ids.drawing_id, "5521");

        assert!(extract_drawing_ids("<table></table>").is_none());
    }

    #[test]
    fn lms_identity_tolerates_missing_userid() {
        let full = r#"{"sesskey":"YJlfrokKBP","userid":"75147"}"#;
        let identity = extract_lms_identity(full).unwrap();
        assert_eq!(identity.sesskey, "YJlfrokKBP");
        assert_eq!(identity.userid.as_deref(), Some("75147"));

        let partial = r#"<input name="sesskey" value="abc"/>"#;
        let identity = extract_lms_identity(partial).unwrap();
        assert_eq!(identity.sesskey, "abc");
        assert!(identity.userid.is_none());

        assert!(extract_lms_identity("<html></html>").is_none());
    }

    #[test]
    fn registration_window_parses_flag_and_dates() {
        let html = r#"
            <input id="hdTrongHanDK" value="true"/>
            <span>01/02/2026 08:00</span> - <span>15/02/2026 17:00</span>
        "#;
        let window = parse_registration_window(html);
        assert!(window.is_open);
        assert_eq!(window.from, "01/02/2026 08:00");
        assert_eq!(window.to, "15/02/2026 17:00");

        let empty = parse_registration_window("<html></html>");
        assert!(!empty.is_open);
        assert!(empty.from.is_empty());
    }

    #[test]
    fn rounds_classify_by_now() {
        let html = concat!(
            r#"<tr onclick="ketQuaDangKyView(100, 'x')"><td>1</td><td >HK251</td>"#,
            r#"<td>Đợt chính thức - <b>kết quả</b></td><td>01/02/2026 08:00</td><td>15/02/2026 17:00</td></tr>"#,
        );
        let now = parse_vietnamese_date("10/02/2026 12:00").unwrap();
        let rounds = parse_registration_rounds(html, now);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].id, 100);
        assert_eq!(rounds[0].code, "HK251");
        assert_eq!(rounds[0].description, "Đợt chính thức - kết quả");
        assert_eq!(rounds[0].status, RoundStatus::Open);
        assert!(rounds[0].has_result);

        let later = parse_vietnamese_date("01/03/2026 00:00").unwrap();
        assert_eq!(parse_registration_rounds(html, later)[0].status, RoundStatus::Closed);
    }

    #[test]
    fn result_set_parses_courses_and_totals() {
        let html = concat!(
            "<div class='col-md-1'>1</div>",
            "<div class='col-md-8'>CO1005 - Nhập môn điện toán ",
            "<a onclick='xoaKetQuaDangKy(9001)'>x</a></div>",
            "<div class='col-md-1'> 3.0 </div>",
            "Tổng số tín chỉ đăng ký: 3.0 Tổng số môn đăng ký: 1",
        );
        let results = parse_registration_results(html);
        assert_eq!(results.courses.len(), 1);
        let course = &results.courses[0];
        assert_eq!(course.code, "CO1005");
        assert_eq!(course.name, "Nhập môn điện toán");
        assert_eq!(course.ketqua_id.as_deref(), Some("9001"));
        assert!(!course.is_locked);
        assert!(course.can_delete);
        assert_eq!(results.total_credits, 3.0);
        assert_eq!(results.total_courses, 1);
    }

    #[test]
    fn locked_course_cannot_be_deleted() {
        let html = concat!(
            "<div class='col-md-1'>1</div>",
            "<div class='col-md-8'>CO1005 - Course ",
            "<a onclick='xoaKetQuaDangKy(9001)'>x</a></div>",
            "<div class='col-md-1'>3.0</div>",
            "<i class='fa fa-lock'></i>",
        );
        let results = parse_registration_results(html);
        assert!(results.courses[0].is_locked);
        assert!(!results.courses[0].can_delete);
    }

    #[test]
    fn malformed_result_html_degrades_to_empty() {
        let results = parse_registration_results("<div>redesigned page</div>");
        assert!(results.courses.is_empty());
        assert_eq!(results.total_courses, 0);
    }

    #[test]
    fn search_rows_parse() {
        let html = concat!(
            "<tr id='monHoc123' onclick='getThongTinNhomLopMonHoc(this, 456)'>",
            r#"<td class="item_list">1 </td>"#,
            "<td class='item_list' >CO2003 </td>",
            "<td class='item_list' >Cấu trúc dữ liệu</td>",
            "<td class='item_list' >4.0</td></tr>",
        );
        let hits = parse_search_results(html);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].mon_hoc_id, "123");
        assert_eq!(hits[0].nhom_lop_id, "456");
        assert_eq!(hits[0].code, "CO2003");
        assert_eq!(hits[0].credits, 4.0);

        assert!(parse_search_results("<table></table>").is_empty());
    }

    #[test]
    fn class_groups_parse_header_and_schedule() {
        let html = concat!(
            "<hr/>",
            r#"<tr style="border-bottom:2px #ccc  solid;">"#,
            "<td class='item_list'>L01</td>",
            "<td class='item_list'>35/40</td>",
            "<td class='item_list'>V</td>",
            "<td class='item_list'>L01</td>",
            "<td class='item_list'>Nguyễn Văn A</td>",
            "<td class='item_list'>-</td>",
            "<td class='item_list'>-</td>",
            "<td class='item_list'>40</td>",
            "<td class='item_list'><a onclick='dangKyNhomLopMonHoc(this, 555, 123)'>DK</a></td>",
            "</tr>",
            "<table width=\"100%\" class='table'>",
            "<tr><th>Thứ</th></tr>",
            "<tr><td class='item_list'>2</td><td class='item_list'>2 3 4</td>",
            "<td class='item_list'>B4-202</td><td class='item_list'>BK-CS2</td>",
            "<td class='item_list'>LT</td><td class='item_list'>--|09|10|11|</td></tr>",
            "</table>",
        );
        let groups = parse_class_groups(html);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.group_code, "L01");
        assert_eq!(group.registered, 35);
        assert_eq!(group.capacity, 40);
        assert!(!group.is_full);
        assert!(group.can_register);
        assert_eq!(group.nlmh_id.as_deref(), Some("555"));
        assert_eq!(group.mon_hoc_id.as_deref(), Some("123"));
        assert_eq!(group.schedules.len(), 1);
        assert_eq!(group.schedules[0].time_slots, "2, 3, 4");
        assert_eq!(group.schedules[0].room, "B4-202");
    }

    #[test]
    fn group_without_button_is_not_registrable() {
        let html = concat!(
            "<hr/>",
            r#"<tr style="border-bottom:2px #ccc  solid;">"#,
            "<td class='item_list'>L02</td>",
            "<td class='item_list'>40/40</td>",
            "<td class='item_list'></td>",
            "<td class='item_list'></td>",
            "<td class='item_list'></td>",
            "<td class='item_list'></td>",
            "<td class='item_list'></td>",
            "<td class='item_list'>40</td>",
            "<td class='item_list'>Hết chỗ</td>",
            "</tr>",
        );
        let groups = parse_class_groups(html);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].can_register);
        assert!(groups[0].is_full);
        assert_eq!(groups[0].language, "V");
        assert!(groups[0].schedules.is_empty());
    }

    #[test]
    fn vietnamese_dates_parse_with_and_without_time() {
        assert!(parse_vietnamese_date("01/02/2026 08:00").is_some());
        assert!(parse_vietnamese_date("01/02/2026").is_some());
        assert!(parse_vietnamese_date("").is_none());
        assert!(parse_vietnamese_date("2026-02-01").is_none());
    }
}
