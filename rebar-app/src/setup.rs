use rebar_config::{AppConfig, LayoutConfig, ScheduleConfig, TablesConfig};
use rebar_engine::{
    BarProperties, BendRadiusTable, ScheduleBuilder, ScheduleSettings, TracingObserver,
    WeightTable,
};
use rebar_layout::{HookLengthTable, LayoutOptions, ShapeDiagramLayout};

pub fn schedule_settings(config: &ScheduleConfig) -> ScheduleSettings {
    ScheduleSettings {
        cluster_tolerance: config.cluster_tolerance,
        text_width_factor: config.text_width_factor,
        drawing_units_per_cm: config.drawing_units_per_cm,
        default_zone: config.default_zone.clone(),
        zone_layer_prefix: config.zone_layer_prefix.clone(),
    }
}

/// 内建 CNS 表叠加配置中的条目。
pub fn weight_table(tables: &TablesConfig) -> WeightTable {
    WeightTable::standard().with_overrides(tables.weights.iter().map(|entry| {
        (
            entry.designation.clone(),
            BarProperties::new(entry.diameter_mm, entry.unit_weight, entry.grade.clone()),
        )
    }))
}

pub fn bend_radius_table(tables: &TablesConfig) -> BendRadiusTable {
    BendRadiusTable::standard().with_overrides(
        tables
            .bend_radius_multipliers
            .iter()
            .map(|(designation, multiplier)| (designation.clone(), *multiplier)),
    )
}

pub fn hook_length_table(tables: &TablesConfig) -> HookLengthTable {
    HookLengthTable::default().with_overrides(
        tables
            .hook_lengths
            .iter()
            .map(|(designation, length)| (designation.clone(), *length)),
    )
}

pub fn layout_options(config: &LayoutConfig) -> LayoutOptions {
    LayoutOptions {
        straight_length: config.straight_length,
        label_margin: config.label_margin,
        canvas_width: config.canvas_width,
        canvas_height: config.canvas_height,
        ..LayoutOptions::default()
    }
}

pub fn schedule_builder(config: &AppConfig) -> ScheduleBuilder {
    ScheduleBuilder::new(schedule_settings(&config.schedule))
        .with_weights(weight_table(&config.tables))
        .with_bend_radii(bend_radius_table(&config.tables))
        .with_observer(TracingObserver)
}

pub fn diagram_layout(config: &AppConfig) -> ShapeDiagramLayout {
    ShapeDiagramLayout::new(
        layout_options(&config.layout),
        hook_length_table(&config.tables),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebar_config::WeightEntry;

    #[test]
    fn configured_tables_override_builtin_values() {
        let mut config = AppConfig::default();
        config.tables.weights.push(WeightEntry {
            designation: "D16".to_string(),
            diameter_mm: 16.0,
            unit_weight: 1.56,
            grade: "SD390".to_string(),
        });
        config
            .tables
            .bend_radius_multipliers
            .insert("#4".to_string(), 6.0);
        config.tables.hook_lengths.insert("#4".to_string(), 9.0);

        let weights = weight_table(&config.tables);
        assert_eq!(weights.lookup("D16").grade, "SD390");
        assert_eq!(weights.lookup("#4").unit_weight_kg_per_m, 0.996);

        assert_eq!(bend_radius_table(&config.tables).multiplier("#4"), 6.0);
        assert_eq!(hook_length_table(&config.tables).length_cm("#4"), 9.0);
        assert_eq!(hook_length_table(&config.tables).length_cm("#5"), 15.0);
    }

    #[test]
    fn settings_follow_config_sections() {
        let mut config = AppConfig::default();
        config.schedule.default_zone = "一樓".to_string();
        config.layout.straight_length = 150.0;

        let settings = schedule_settings(&config.schedule);
        assert_eq!(settings.default_zone, "一樓");
        assert_eq!(settings.cluster_tolerance, 30.0);

        let options = layout_options(&config.layout);
        assert_eq!(options.straight_length, 150.0);
        assert_eq!(options.arm_length, LayoutOptions::default().arm_length);
    }
}
