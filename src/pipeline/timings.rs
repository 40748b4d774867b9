//! Per-build timing record.

use owo_colors::OwoColorize;

use crate::core::Category;

/// Milliseconds spent per category plus the whole build.
///
/// A fresh value is created for every build; categories that did not run
/// stay `None` and render as `-`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    markup: Option<u64>,
    script: Option<u64>,
    style: Option<u64>,
    asset: Option<u64>,
    total: Option<u64>,
}

impl Timings {
    pub fn record(&mut self, category: Category, ms: u64) {
        *self.slot(category) = Some(ms);
    }

    pub fn set_total(&mut self, ms: u64) {
        self.total = Some(ms);
    }

    pub fn get(&self, category: Category) -> Option<u64> {
        match category {
            Category::Markup => self.markup,
            Category::Script => self.script,
            Category::Style => self.style,
            Category::Asset => self.asset,
        }
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    fn slot(&mut self, category: Category) -> &mut Option<u64> {
        match category {
            Category::Markup => &mut self.markup,
            Category::Script => &mut self.script,
            Category::Style => &mut self.style,
            Category::Asset => &mut self.asset,
        }
    }

    /// `markup=12ms | script=- | style=40ms | asset=- | total=55ms`
    pub fn summary(&self) -> String {
        self.render(|ms| format!("{ms}ms"))
    }

    /// Same as [`summary`](Self::summary), values colored by duration
    /// (green under 2s, yellow up to 5s, red above).
    pub fn colored_summary(&self) -> String {
        self.render(|ms| {
            let text = format!("{ms}ms");
            match ms {
                0..2000 => text.green().to_string(),
                2000..=5000 => text.yellow().to_string(),
                _ => text.red().to_string(),
            }
        })
    }

    fn render(&self, value: impl Fn(u64) -> String) -> String {
        let field = |ms: Option<u64>| ms.map_or_else(|| "-".to_string(), &value);
        let mut parts: Vec<String> = Category::ALL
            .iter()
            .map(|&category| format!("{}={}", category.name(), field(self.get(category))))
            .collect();
        parts.push(format!("total={}", field(self.total)));
        parts.join(" | ")
    }
}
