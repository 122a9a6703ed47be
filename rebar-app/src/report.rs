use std::fmt::{self, Write};

use rebar_core::rebar::{RebarRecord, format_length};
use rebar_core::schedule::{BuildStats, ZoneSchedule};
use rebar_io::ScheduleDocument;

/// 完整报表：各分区明细、号数汇总、合计、跳过统计与指纹。
pub fn render(document: &ScheduleDocument) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for zone in document.schedule.zones() {
        write_zone(&mut out, zone)?;
    }
    write_summary(&mut out, document)?;
    Ok(out)
}

/// 精简报表，不含分区明细。
pub fn render_summary(document: &ScheduleDocument) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_summary(&mut out, document)?;
    Ok(out)
}

fn write_summary(out: &mut impl Write, document: &ScheduleDocument) -> fmt::Result {
    writeln!(out, "== 號數彙總 ==")?;
    writeln!(
        out,
        "{:<6} {:>8} {:>6} {:>6} {:>8} {:>12} {:>10}",
        "號數", "直徑mm", "等級", "筆數", "支數", "長度cm", "重量kg"
    )?;
    for item in &document.summary {
        writeln!(
            out,
            "{:<6} {:>8.1} {:>6} {:>6} {:>8} {:>12.1} {:>10.3}",
            item.designation,
            item.diameter_mm,
            item.grade,
            item.records,
            item.bars,
            item.length_cm,
            item.weight_kg
        )?;
    }

    let totals = &document.totals;
    writeln!(
        out,
        "合計: {} 筆, {} 支, {:.1} cm, {:.3} kg",
        totals.records, totals.bars, totals.length_cm, totals.weight_kg
    )?;
    write_skipped(out, document.schedule.stats())?;
    writeln!(out, "指紋: {}", document.fingerprint)
}

fn write_zone(out: &mut impl Write, zone: &ZoneSchedule) -> fmt::Result {
    writeln!(out, "== 區域 {} ({} 筆) ==", zone.name, zone.records.len())?;
    for record in &zone.records {
        write_record(out, record)?;
    }
    writeln!(out)
}

fn write_record(out: &mut impl Write, record: &RebarRecord) -> fmt::Result {
    let segments = record
        .segments()
        .iter()
        .map(|segment| format_length(*segment))
        .collect::<Vec<_>>()
        .join("+");
    let flag = if record.unknown_designation { " (未知號數)" } else { "" };
    writeln!(
        out,
        "{:>4} {:<6} {:<10} {:<20} x{:<5} {:>10} cm {:>10.3} kg  {}{}",
        record.id,
        record.designation(),
        record.shape().describe(),
        segments,
        record.count(),
        format_length(record.total_length_cm),
        record.total_weight_kg,
        record.note(),
        flag
    )
}

fn write_skipped(out: &mut impl Write, stats: &BuildStats) -> fmt::Result {
    if stats.malformed_notation > 0 {
        writeln!(out, "略過 {} 筆格式錯誤的標註", stats.malformed_notation)?;
    }
    if stats.unlabeled_groups > 0 {
        writeln!(out, "略過 {} 組缺少號數的圖形", stats.unlabeled_groups)?;
    }
    if stats.unknown_designations > 0 {
        writeln!(out, "{} 筆號數不在單位重表中，重量以 0 計", stats.unknown_designations)?;
    }
    if stats.zone_misses > 0 {
        writeln!(out, "{} 筆未落在任何區域，歸入預設區域", stats.zone_misses)?;
    }
    Ok(())
}
