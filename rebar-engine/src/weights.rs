use std::collections::BTreeMap;

use rebar_core::rebar::base_designation;

pub const UNKNOWN_GRADE: &str = "unknown";
const DEFAULT_BEND_MULTIPLIER: f64 = 4.0;

/// CNS 560 标准钢筋：号数、直径（mm）、单位重（kg/m）。
const STANDARD_BARS: [(&str, f64, f64); 13] = [
    ("#2", 6.4, 0.249),
    ("#3", 9.5, 0.561),
    ("#4", 12.7, 0.996),
    ("#5", 15.9, 1.552),
    ("#6", 19.1, 2.235),
    ("#7", 22.2, 3.042),
    ("#8", 25.4, 3.973),
    ("#9", 28.7, 5.026),
    ("#10", 32.3, 6.404),
    ("#11", 35.8, 7.906),
    ("#12", 43.0, 11.38),
    ("#13", 50.0, 13.87),
    ("#14", 57.0, 14.59),
];

#[derive(Debug, Clone, PartialEq)]
pub struct BarProperties {
    pub diameter_mm: f64,
    pub unit_weight_kg_per_m: f64,
    pub grade: String,
}

impl BarProperties {
    pub fn new(diameter_mm: f64, unit_weight_kg_per_m: f64, grade: impl Into<String>) -> Self {
        Self {
            diameter_mm,
            unit_weight_kg_per_m,
            grade: grade.into(),
        }
    }

    /// 未知号数：直径、单位重为 0，等级为 `unknown`。
    pub fn unknown() -> Self {
        Self::new(0.0, 0.0, UNKNOWN_GRADE)
    }

    fn is_valid(&self) -> bool {
        self.diameter_mm.is_finite()
            && self.diameter_mm >= 0.0
            && self.unit_weight_kg_per_m.is_finite()
            && self.unit_weight_kg_per_m >= 0.0
    }
}

/// 号数 → {直径, 单位重, 等级} 的只读查表，构建后不再修改。
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    entries: BTreeMap<String, BarProperties>,
}

impl WeightTable {
    pub fn standard() -> Self {
        Self::from_entries(STANDARD_BARS.iter().map(|(designation, diameter, unit)| {
            let properties = BarProperties::new(*diameter, *unit, standard_grade(designation));
            (designation.to_string(), properties)
        }))
    }

    /// 由外部数据构造；负值或非有限值的条目被忽略。
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, BarProperties)>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(designation, properties)| (designation.into(), properties))
            .filter(|(_, properties)| properties.is_valid())
            .collect();
        Self { entries }
    }

    /// 在当前表上覆盖或追加条目。
    pub fn with_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, BarProperties)>,
        S: Into<String>,
    {
        let extra = Self::from_entries(overrides);
        self.entries.extend(extra.entries);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `N#k` 先按原样查找，找不到时回退到 `#k`。
    pub fn get(&self, designation: &str) -> Option<&BarProperties> {
        self.entries
            .get(designation)
            .or_else(|| self.entries.get(base_designation(designation)))
    }

    #[inline]
    pub fn contains(&self, designation: &str) -> bool {
        self.get(designation).is_some()
    }

    pub fn lookup(&self, designation: &str) -> BarProperties {
        self.get(designation)
            .cloned()
            .unwrap_or_else(BarProperties::unknown)
    }

    /// `单位重 × (总长cm / 100) × 支数`，结果不为负。
    pub fn weight(&self, designation: &str, total_length_cm: f64, count: u32) -> f64 {
        let unit = self
            .get(designation)
            .map(|properties| properties.unit_weight_kg_per_m)
            .unwrap_or(0.0);
        let weight = unit * (total_length_cm / 100.0) * f64::from(count);
        if weight.is_finite() && weight > 0.0 { weight } else { 0.0 }
    }

    pub fn designations(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_grade(designation: &str) -> &'static str {
    match rebar_core::rebar::bar_size(designation) {
        Some(size) if size <= 6 => "SD280",
        Some(size) if size <= 10 => "SD420",
        Some(_) => "SD490",
        None => UNKNOWN_GRADE,
    }
}

/// 弯曲内半径倍数表：`弯曲半径 = 直径 × 倍数`，缺省倍数为 4。
#[derive(Debug, Clone, PartialEq)]
pub struct BendRadiusTable {
    multipliers: BTreeMap<String, f64>,
    default_multiplier: f64,
}

impl BendRadiusTable {
    pub fn standard() -> Self {
        let multipliers = STANDARD_BARS
            .iter()
            .filter_map(|(designation, _, _)| {
                let size = rebar_core::rebar::bar_size(designation)?;
                let multiplier = if size <= 3 { 3.0 } else { f64::from(size) };
                Some((designation.to_string(), multiplier))
            })
            .collect();
        Self {
            multipliers,
            default_multiplier: DEFAULT_BEND_MULTIPLIER,
        }
    }

    pub fn with_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        for (designation, multiplier) in overrides {
            if multiplier.is_finite() && multiplier > 0.0 {
                self.multipliers.insert(designation.into(), multiplier);
            }
        }
        self
    }

    pub fn multiplier(&self, designation: &str) -> f64 {
        self.multipliers
            .get(designation)
            .or_else(|| self.multipliers.get(base_designation(designation)))
            .copied()
            .unwrap_or(self.default_multiplier)
    }

    #[inline]
    pub fn radius_mm(&self, designation: &str, diameter_mm: f64) -> f64 {
        diameter_mm * self.multiplier(designation)
    }
}

impl Default for BendRadiusTable {
    fn default() -> Self {
        Self::standard()
    }
}
