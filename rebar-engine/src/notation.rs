use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::trace;

use rebar_core::rebar::{
    NotationFamily, RebarSpec, ShapeKind, StirrupKind, TieKind, format_length,
};

const SYMMETRY_TOLERANCE: f64 = 1e-3;
const DEFAULT_BEND_ANGLE: f64 = 90.0;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d)?$").expect("valid number regex"));

static STIRRUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(地箍|U箍|L箍|柱箍|牆箍|半箍)\s*(N?#\d+)\s*\(([^)]*)\)\s*(?:[=x]\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid stirrup regex")
});

static TIE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(柱繫|梁繫|牆繫)\s*(N?#\d+)\s*-\s*([^\s=x]+)(?:\s*x\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid tie regex")
});

static ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^安\s*(N?#\d+)\s*-\s*([^\s=x]+)(?:\s*=\s*([^\s=x]+))?(?:\s*x\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid anchor regex")
});

static STRAIGHT_ARC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^直弧\s*R?\s*([^\s#]+)\s*(N?#\d+)\s*-\s*([^\s=x]+)(?:\s*x\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid straight-arc regex")
});

static ARC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^弧\s*R?\s*([^\s#]+)\s*(N?#\d+)\s*-\s*([^\s=x]+)(?:\s*x\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid arc regex")
});

static BENT_FOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^折\s*([^\s#°]+)\s*°?\s*(N?#\d+)\s*-\s*([^\s=x]+)(?:\s*x\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid fold regex")
});

static BENT_V: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)[Vv]\s*([^\s#°]+)\s*°\s*(N?#\d+)\s*-\s*([^\s=x]+)(?:\s*x\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid v-angle regex")
});

static PLAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(N?#\d+)\s*-\s*([^\s=x]+)(?:\s*=\s*([^\s=x]+))?(?:\s*x\s*([^\s\p{Han}()]+))?\s*(.*)$")
        .expect("valid plain regex")
});

/// 单行标注的解析结果。
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(RebarSpec),
    /// 没有任何文法命中，不是错误。
    Miss,
    /// 文法命中但数值记号无效，整条候选被丢弃。
    Malformed {
        family: NotationFamily,
        token: String,
    },
}

impl ParseOutcome {
    pub fn into_spec(self) -> Option<RebarSpec> {
        match self {
            ParseOutcome::Parsed(spec) => Some(spec),
            ParseOutcome::Miss | ParseOutcome::Malformed { .. } => None,
        }
    }
}

/// 配筋标注文法引擎。按从具体到一般的顺序尝试各子文法，首个命中者胜出。
#[derive(Debug, Clone, Copy, Default)]
pub struct NotationParser;

impl NotationParser {
    pub fn new() -> Self {
        Self
    }

    /// 解析一行标注，不命中或格式错误时返回 `None`。
    pub fn parse(&self, text: &str) -> Option<RebarSpec> {
        self.parse_detailed(text).into_spec()
    }

    /// 与 [`parse`](Self::parse) 相同，但区分“未命中”与“格式错误”。
    pub fn parse_detailed(&self, text: &str) -> ParseOutcome {
        let raw = text.trim();
        if raw.is_empty() {
            return ParseOutcome::Miss;
        }
        let normalized = normalize(raw);
        let source = normalized.as_str();

        let outcome = parse_stirrup(source, raw)
            .or_else(|| parse_tie(source, raw))
            .or_else(|| parse_anchor(source, raw))
            .or_else(|| parse_straight_arc(source, raw))
            .or_else(|| parse_arc(source, raw))
            .or_else(|| parse_bent(source, raw))
            .or_else(|| parse_plain(source, raw))
            .unwrap_or(ParseOutcome::Miss);

        match &outcome {
            ParseOutcome::Parsed(spec) => trace!(
                text = raw,
                family = ?spec.family,
                shape = ?spec.shape,
                "标注解析成功"
            ),
            ParseOutcome::Malformed { family, token } => trace!(
                text = raw,
                family = ?family,
                token = token.as_str(),
                "标注数值无效，整条丢弃"
            ),
            ParseOutcome::Miss => {}
        }
        outcome
    }
}

/// 按分段数判定形状：1 段直料，2 段 L 型，3 段首尾相等为 U 型否则为阶梯，更多段为折料。
pub fn classify(segments: &[f64]) -> ShapeKind {
    classify_designated("#", segments)
}

/// 带号数的形状判定，`N#` 号数的 3 段钢筋为 N 型。
pub fn classify_designated(designation: &str, segments: &[f64]) -> ShapeKind {
    match segments {
        [] => ShapeKind::Unknown,
        [_] => ShapeKind::Straight,
        [_, _] => ShapeKind::Hooked,
        [first, _, last] => {
            if is_n_designation(designation) {
                ShapeKind::NShape
            } else if (first - last).abs() < SYMMETRY_TOLERANCE {
                ShapeKind::U
            } else {
                ShapeKind::Stepped
            }
        }
        _ => ShapeKind::Bent,
    }
}

fn is_n_designation(designation: &str) -> bool {
    designation.starts_with("N#") || designation.starts_with("n#")
}

fn normalize(text: &str) -> String {
    let mapped: String = text
        .replace("Â°", "°")
        .chars()
        .map(|ch| match ch {
            '×' | 'X' | 'ｘ' | 'Ｘ' => 'x',
            '，' => ',',
            '＃' => '#',
            '＋' => '+',
            '＝' => '=',
            '－' => '-',
            '（' => '(',
            '）' => ')',
            'º' | '˚' => '°',
            '墙' => '牆',
            other => other,
        })
        .collect();
    mapped
        .replace("n#", "N#")
        .replace("u箍", "U箍")
        .replace("l箍", "L箍")
}

fn parse_number(token: &str) -> Result<f64, String> {
    let token = token.trim();
    if !NUMBER.is_match(token) {
        return Err(token.to_string());
    }
    token.parse::<f64>().map_err(|_| token.to_string())
}

fn parse_segments(list: &str) -> Result<Vec<f64>, String> {
    list.split('+').map(parse_number).collect()
}

/// 缺省为 1，非正数强制为 1。
fn parse_count(token: Option<&str>) -> Result<u32, String> {
    let Some(token) = token else {
        return Ok(1);
    };
    let value: i64 = token.trim().parse().map_err(|_| token.to_string())?;
    if value <= 0 {
        return Ok(1);
    }
    u32::try_from(value).map_err(|_| token.to_string())
}

fn parse_angle(token: &str) -> Result<f64, String> {
    let angle = parse_number(token)?;
    if angle <= 0.0 || angle > 180.0 {
        return Err(token.to_string());
    }
    Ok(angle)
}

fn group<'t>(caps: &Captures<'t>, index: usize) -> &'t str {
    caps.get(index).map(|m| m.as_str()).unwrap_or("")
}

fn optional<'t>(caps: &Captures<'t>, index: usize) -> Option<&'t str> {
    caps.get(index).map(|m| m.as_str())
}

fn compose_note(base: &str, extras: &[&str]) -> String {
    let mut note = base.to_string();
    for extra in extras.iter().map(|extra| extra.trim()) {
        if extra.is_empty() {
            continue;
        }
        if !note.is_empty() {
            note.push(' ');
        }
        note.push_str(extra);
    }
    note
}

fn finish(family: NotationFamily, result: Result<RebarSpec, String>) -> ParseOutcome {
    match result {
        Ok(spec) => ParseOutcome::Parsed(spec),
        Err(token) => ParseOutcome::Malformed { family, token },
    }
}

fn require_arity(list: &str, segments: Vec<f64>, arity: usize) -> Result<Vec<f64>, String> {
    if segments.len() == arity {
        Ok(segments)
    } else {
        Err(list.to_string())
    }
}

fn parse_stirrup(source: &str, raw: &str) -> Option<ParseOutcome> {
    let caps = STIRRUP.captures(source)?;
    let family = NotationFamily::Stirrup;
    let result = (|| -> Result<RebarSpec, String> {
        let keyword = group(&caps, 1);
        let kind = StirrupKind::from_keyword(keyword).ok_or_else(|| keyword.to_string())?;
        let dims = group(&caps, 3);
        let segments = dims
            .split('x')
            .map(parse_number)
            .collect::<Result<Vec<_>, _>>()?;
        let segments = require_arity(dims, segments, 2)?;
        Ok(RebarSpec {
            designation: group(&caps, 2).to_string(),
            segments,
            angles: Vec::new(),
            radius: None,
            count: parse_count(optional(&caps, 4))?,
            shape: ShapeKind::Stirrup(kind),
            family,
            explicit_total: None,
            note: compose_note(kind.keyword(), &[group(&caps, 5)]),
            raw_text: raw.to_string(),
        })
    })();
    Some(finish(family, result))
}

fn parse_tie(source: &str, raw: &str) -> Option<ParseOutcome> {
    let caps = TIE.captures(source)?;
    let family = NotationFamily::Tie;
    let result = (|| -> Result<RebarSpec, String> {
        let keyword = group(&caps, 1);
        let kind = TieKind::from_keyword(keyword).ok_or_else(|| keyword.to_string())?;
        let list = group(&caps, 3);
        let segments = require_arity(list, parse_segments(list)?, 1)?;
        Ok(RebarSpec {
            designation: group(&caps, 2).to_string(),
            segments,
            angles: Vec::new(),
            radius: None,
            count: parse_count(optional(&caps, 4))?,
            shape: ShapeKind::Tie(kind),
            family,
            explicit_total: None,
            note: compose_note(kind.keyword(), &[group(&caps, 5)]),
            raw_text: raw.to_string(),
        })
    })();
    Some(finish(family, result))
}

/// 一般文法（直料、安全弯钩）共用：号数、分段、可选总长、数量。
fn straight_family_spec(
    caps: &Captures<'_>,
    raw: &str,
    family: NotationFamily,
) -> Result<RebarSpec, String> {
    let designation = group(caps, 1).to_string();
    let segments = parse_segments(group(caps, 2))?;
    let explicit_total = optional(caps, 3).map(parse_number).transpose()?;
    let count = parse_count(optional(caps, 4))?;
    let shape = classify_designated(&designation, &segments);
    let angles = if shape == ShapeKind::Bent {
        vec![DEFAULT_BEND_ANGLE; segments.len() - 1]
    } else {
        Vec::new()
    };
    let base = match (family, shape) {
        (NotationFamily::Anchor, _) => "安全彎鉤直",
        (_, ShapeKind::Straight) => "直料",
        (_, other) => other.describe(),
    };
    Ok(RebarSpec {
        designation,
        segments,
        angles,
        radius: None,
        count,
        shape,
        family,
        explicit_total,
        note: compose_note(base, &[group(caps, 5)]),
        raw_text: raw.to_string(),
    })
}

fn parse_anchor(source: &str, raw: &str) -> Option<ParseOutcome> {
    let caps = ANCHOR.captures(source)?;
    let family = NotationFamily::Anchor;
    Some(finish(family, straight_family_spec(&caps, raw, family)))
}

fn parse_straight_arc(source: &str, raw: &str) -> Option<ParseOutcome> {
    let caps = STRAIGHT_ARC.captures(source)?;
    let family = NotationFamily::StraightArc;
    let result = (|| -> Result<RebarSpec, String> {
        let radius = parse_number(group(&caps, 1))?;
        let list = group(&caps, 3);
        let segments = require_arity(list, parse_segments(list)?, 2)?;
        let base = format!("直段+弧段 R{}", format_length(radius));
        Ok(RebarSpec {
            designation: group(&caps, 2).to_string(),
            segments,
            angles: Vec::new(),
            radius: Some(radius),
            count: parse_count(optional(&caps, 4))?,
            shape: ShapeKind::SteppedArc,
            family,
            explicit_total: None,
            note: compose_note(&base, &[group(&caps, 5)]),
            raw_text: raw.to_string(),
        })
    })();
    Some(finish(family, result))
}

fn parse_arc(source: &str, raw: &str) -> Option<ParseOutcome> {
    let caps = ARC.captures(source)?;
    let family = NotationFamily::Arc;
    let result = (|| -> Result<RebarSpec, String> {
        let radius = parse_number(group(&caps, 1))?;
        let list = group(&caps, 3);
        let segments = require_arity(list, parse_segments(list)?, 1)?;
        let base = format!("直料圓弧 R{}", format_length(radius));
        Ok(RebarSpec {
            designation: group(&caps, 2).to_string(),
            segments,
            angles: Vec::new(),
            radius: Some(radius),
            count: parse_count(optional(&caps, 4))?,
            shape: ShapeKind::Arc,
            family,
            explicit_total: None,
            note: compose_note(&base, &[group(&caps, 5)]),
            raw_text: raw.to_string(),
        })
    })();
    Some(finish(family, result))
}

fn parse_bent(source: &str, raw: &str) -> Option<ParseOutcome> {
    // (前缀, 角度, 号数, 分段, 数量, 尾注) 的捕获组序号
    let (caps, indices) = match BENT_FOLD.captures(source) {
        Some(caps) => (caps, (None, 1, 2, 3, 4, 5)),
        None => (BENT_V.captures(source)?, (Some(1), 2, 3, 4, 5, 6)),
    };
    let (prefix, angle_idx, designation_idx, list_idx, count_idx, note_idx) = indices;
    let family = NotationFamily::Bent;
    let result = (|| -> Result<RebarSpec, String> {
        let angle = parse_angle(group(&caps, angle_idx))?;
        let list = group(&caps, list_idx);
        let segments = parse_segments(list)?;
        if segments.len() < 2 {
            return Err(list.to_string());
        }
        let base = format!("折料 {}°", format_length(angle));
        let prefix = prefix.map(|index| group(&caps, index)).unwrap_or("");
        Ok(RebarSpec {
            designation: group(&caps, designation_idx).to_string(),
            angles: vec![angle; segments.len() - 1],
            segments,
            radius: None,
            count: parse_count(optional(&caps, count_idx))?,
            shape: ShapeKind::Bent,
            family,
            explicit_total: None,
            note: compose_note(&base, &[prefix, group(&caps, note_idx)]),
            raw_text: raw.to_string(),
        })
    })();
    Some(finish(family, result))
}

fn parse_plain(source: &str, raw: &str) -> Option<ParseOutcome> {
    let caps = PLAIN.captures(source)?;
    let family = NotationFamily::Plain;
    Some(finish(family, straight_family_spec(&caps, raw, family)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> RebarSpec {
        NotationParser::new()
            .parse(text)
            .unwrap_or_else(|| panic!("`{text}` should parse"))
    }

    #[test]
    fn plain_straight_bar() {
        let spec = parse("#4-300x10");
        assert_eq!(spec.designation, "#4");
        assert_eq!(spec.segments, vec![300.0]);
        assert_eq!(spec.count, 10);
        assert_eq!(spec.shape, ShapeKind::Straight);
        assert_eq!(spec.family, NotationFamily::Plain);
        assert_eq!(spec.note, "直料");
        assert_eq!(spec.raw_text, "#4-300x10");
    }

    #[test]
    fn v_angle_bent_bar() {
        let spec = parse("V113°#10-900+200x2");
        assert_eq!(spec.designation, "#10");
        assert_eq!(spec.segments, vec![900.0, 200.0]);
        assert_eq!(spec.angles, vec![113.0]);
        assert_eq!(spec.count, 2);
        assert_eq!(spec.shape, ShapeKind::Bent);
        assert!((spec.total_length() - 1100.0).abs() < 1e-9);
        assert_eq!(spec.note, "折料 113°");
    }

    #[test]
    fn mojibake_degree_sign_is_accepted() {
        let spec = parse("V113Â°#10-900+200x2");
        assert_eq!(spec.angles, vec![113.0]);
    }

    #[test]
    fn ground_stirrup() {
        let spec = parse("地箍#5(50x75)=20");
        assert_eq!(spec.designation, "#5");
        assert_eq!(spec.segments, vec![50.0, 75.0]);
        assert_eq!(spec.count, 20);
        assert_eq!(spec.shape, ShapeKind::Stirrup(StirrupKind::Ground));
        assert_eq!(spec.note, "地箍");
    }

    #[test]
    fn lowercase_stirrup_keyword_and_full_width_symbols() {
        let spec = parse("u箍＃4（30Ｘ60）＝8");
        assert_eq!(spec.shape, ShapeKind::Stirrup(StirrupKind::U));
        assert_eq!(spec.designation, "#4");
        assert_eq!(spec.segments, vec![30.0, 60.0]);
        assert_eq!(spec.count, 8);
    }

    #[test]
    fn full_width_multiplication_sign() {
        let spec = parse("  #5-250×4 ");
        assert_eq!(spec.segments, vec![250.0]);
        assert_eq!(spec.count, 4);
        assert_eq!(spec.raw_text, "#5-250×4");
    }

    #[test]
    fn tie_bar() {
        let spec = parse("梁繫#3-45x30");
        assert_eq!(spec.shape, ShapeKind::Tie(TieKind::Beam));
        assert_eq!(spec.segments, vec![45.0]);
        assert_eq!(spec.count, 30);
    }

    #[test]
    fn anchor_bar_with_hook() {
        let spec = parse("安#3-390x40");
        assert_eq!(spec.family, NotationFamily::Anchor);
        assert_eq!(spec.shape, ShapeKind::Straight);
        assert_eq!(spec.note, "安全彎鉤直");

        let hooked = parse("安#4-300+20x6");
        assert_eq!(hooked.shape, ShapeKind::Hooked);
    }

    #[test]
    fn arc_and_straight_arc() {
        let arc = parse("弧500#5-400x3");
        assert_eq!(arc.shape, ShapeKind::Arc);
        assert_eq!(arc.radius, Some(500.0));
        assert_eq!(arc.segments, vec![400.0]);
        assert_eq!(arc.note, "直料圓弧 R500");

        let stepped = parse("直弧R250#4-100+300x2");
        assert_eq!(stepped.shape, ShapeKind::SteppedArc);
        assert_eq!(stepped.radius, Some(250.0));
        assert_eq!(stepped.segments, vec![100.0, 300.0]);
        assert_eq!(stepped.note, "直段+弧段 R250");
    }

    #[test]
    fn fold_angle_repeats_for_every_bend() {
        let spec = parse("折135#4-100+200+100x3");
        assert_eq!(spec.shape, ShapeKind::Bent);
        assert_eq!(spec.angles, vec![135.0, 135.0]);
        assert_eq!(spec.angles.len(), spec.segments.len() - 1);
    }

    #[test]
    fn three_segment_shapes() {
        assert_eq!(parse("#4-150+200+150x5").shape, ShapeKind::U);
        assert_eq!(parse("#4-150+200+120x5").shape, ShapeKind::Stepped);
        assert_eq!(parse("N#4-30+80+30x5").shape, ShapeKind::NShape);
        assert_eq!(parse("n#4-30+80+20x5").designation, "N#4");
    }

    #[test]
    fn classify_by_arity() {
        assert_eq!(classify(&[100.0, 50.0, 100.0]), ShapeKind::U);
        assert_eq!(classify(&[100.0, 50.0, 80.0]), ShapeKind::Stepped);
        assert_eq!(classify(&[100.0]), ShapeKind::Straight);
        assert_eq!(classify(&[100.0, 20.0]), ShapeKind::Hooked);
        assert_eq!(classify(&[]), ShapeKind::Unknown);
    }

    #[test]
    fn more_than_three_segments_become_right_angle_bends() {
        let spec = parse("#5-20+100+200+100x2");
        assert_eq!(spec.shape, ShapeKind::Bent);
        assert_eq!(spec.angles, vec![90.0, 90.0, 90.0]);
    }

    #[test]
    fn explicit_total_and_trailing_note() {
        let spec = parse("#4-150+200+150=520x5 上層");
        assert_eq!(spec.explicit_total, Some(520.0));
        assert!((spec.total_length() - 520.0).abs() < 1e-9);
        assert_eq!(spec.note, "U型 上層");
    }

    #[test]
    fn count_defaults_and_coerces_to_one() {
        assert_eq!(parse("#4-300").count, 1);
        assert_eq!(parse("#4-300x0").count, 1);
        assert_eq!(parse("#4-300x-3").count, 1);
    }

    #[test]
    fn single_decimal_segments_are_accepted() {
        let spec = parse("#3-112.5x4");
        assert_eq!(spec.segments, vec![112.5]);
    }

    #[test]
    fn malformed_numbers_discard_the_whole_candidate() {
        let parser = NotationParser::new();
        for text in [
            "#4-300.25x10",
            "#4-3a0x10",
            "#4-100++50x2",
            "地箍#5(50x75x9)=2",
            "折0#4-100+200",
            "#4-300x2.5",
            "#4-300x.5",
            "#4-300x2a",
            "V113°#10-900+200x2.5",
            "地箍#5(50x75)=2.5",
            "柱繫#3-120x1.5",
        ] {
            match parser.parse_detailed(text) {
                ParseOutcome::Malformed { .. } => {}
                other => panic!("`{text}` should be malformed, got {other:?}"),
            }
            assert!(parser.parse(text).is_none());
        }
    }

    #[test]
    fn count_followed_by_note_keeps_the_note() {
        let spec = parse("#4-300x10上層");
        assert_eq!(spec.count, 10);
        assert_eq!(spec.note, "直料 上層");

        let stirrup = parse("地箍#5(50x75)=20 外圍");
        assert_eq!(stirrup.count, 20);
        assert_eq!(stirrup.note, "地箍 外圍");
    }

    #[test]
    fn bent_requires_two_segments() {
        let parser = NotationParser::new();
        assert!(matches!(
            parser.parse_detailed("V90°#4-300x2"),
            ParseOutcome::Malformed {
                family: NotationFamily::Bent,
                ..
            }
        ));
    }

    #[test]
    fn unrelated_text_is_a_miss() {
        let parser = NotationParser::new();
        for text in ["", "   ", "一樓平面圖", "#4", "S=1/50"] {
            assert_eq!(parser.parse_detailed(text), ParseOutcome::Miss, "{text}");
        }
    }

    #[test]
    fn unknown_designation_still_parses() {
        let spec = parse("#99-120x2");
        assert_eq!(spec.designation, "#99");
        assert_eq!(spec.count, 2);
    }

    #[test]
    fn parsing_is_idempotent() {
        let parser = NotationParser::new();
        for text in ["#4-300x10", "V113°#10-900+200x2", "bogus", "#4-3a0"] {
            assert_eq!(parser.parse_detailed(text), parser.parse_detailed(text));
        }
    }
}
