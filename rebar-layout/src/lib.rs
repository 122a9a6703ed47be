pub mod diagram;

pub use diagram::{DiagramLabel, DiagramLayout, LabelKind, LayoutOptions, ShapeDiagramLayout};
pub use hooks::HookLengthTable;

pub mod hooks {
    use std::collections::BTreeMap;

    use rebar_core::rebar::base_designation;

    pub const DEFAULT_HOOK_LENGTH_CM: f64 = 15.0;

    /// 号数 → 弯钩长度（cm）。缺省 15 cm，具体数值由配置提供。
    #[derive(Debug, Clone, PartialEq)]
    pub struct HookLengthTable {
        lengths: BTreeMap<String, f64>,
        default_length: f64,
    }

    impl HookLengthTable {
        pub fn new(default_length: f64) -> Self {
            Self {
                lengths: BTreeMap::new(),
                default_length,
            }
        }

        pub fn with_overrides<I, S>(mut self, overrides: I) -> Self
        where
            I: IntoIterator<Item = (S, f64)>,
            S: Into<String>,
        {
            for (designation, length) in overrides {
                if length.is_finite() && length > 0.0 {
                    self.lengths.insert(designation.into(), length);
                }
            }
            self
        }

        pub fn length_cm(&self, designation: &str) -> f64 {
            self.lengths
                .get(designation)
                .or_else(|| self.lengths.get(base_designation(designation)))
                .copied()
                .unwrap_or(self.default_length)
        }
    }

    impl Default for HookLengthTable {
        fn default() -> Self {
            Self::new(DEFAULT_HOOK_LENGTH_CM)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn missing_designation_uses_default() {
            let table = HookLengthTable::default().with_overrides([("#4", 12.0), ("#5", -1.0)]);
            assert_eq!(table.length_cm("#4"), 12.0);
            assert_eq!(table.length_cm("N#4"), 12.0);
            assert_eq!(table.length_cm("#5"), 15.0);
            assert_eq!(table.length_cm("#99"), 15.0);
        }
    }
}
