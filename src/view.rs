use crate::chart::{ChartRenderer, Tooltip};
use crate::config::AppConfig;
use crate::map::{MapRenderer, MapSnapshot};
use crate::processing::{decade_options, filter_by_decade, group_counts, record_decade, SortOrder};
use crate::types::{DecadeFilter, GroupedCount, Record, View, ViewState, UNKNOWN};
use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::debug;

/// Which container is showing. The chart and the map are never visible together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Display {
    pub chart_visible: bool,
    pub map_visible: bool,
}

impl Display {
    fn chart() -> Self {
        Self { chart_visible: true, map_visible: false }
    }

    fn map() -> Self {
        Self { chart_visible: false, map_visible: true }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Rendered {
    Chart {
        view: View,
        label: String,
        groups: Vec<GroupedCount>,
        svg: String,
    },
    Map(MapSnapshot),
}

/// Owns the dataset, the interaction state and both renderers.
pub struct ViewController {
    raw: Vec<Record>,
    filtered: Vec<Record>,
    decades: Vec<String>,
    state: ViewState,
    display: Display,
    tooltip: Option<Tooltip>,
    chart: ChartRenderer,
    map: MapRenderer,
}

impl ViewController {
    pub fn new(config: &AppConfig, records: Vec<Record>) -> Self {
        let decades = decade_options(&records);
        Self {
            filtered: records.clone(),
            raw: records,
            decades,
            state: ViewState::default(),
            display: Display::chart(),
            tooltip: None,
            chart: ChartRenderer::new(config.chart.clone()),
            map: MapRenderer::new(config.map.clone()),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn display(&self) -> Display {
        self.display
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    pub fn filtered(&self) -> &[Record] {
        &self.filtered
    }

    pub fn map(&self) -> &MapRenderer {
        &self.map
    }

    /// Filter choices in selector order: `All` first, then every observed decade.
    pub fn decade_options(&self) -> Vec<String> {
        std::iter::once(DecadeFilter::All.to_string())
            .chain(self.decades.iter().cloned())
            .collect()
    }

    pub fn select_view(&mut self, view: View) -> Rendered {
        self.state.view = view;
        self.render()
    }

    pub fn change_filter(&mut self, decade: DecadeFilter) -> Result<Rendered> {
        if let DecadeFilter::Decade(d) = &decade {
            if !self.decades.contains(d) {
                return Err(anyhow!("Unknown decade filter: {}", d));
            }
        }
        self.filtered = filter_by_decade(&self.raw, &decade);
        debug!(decade = %decade, records = self.filtered.len(), "Filter changed");
        self.state.decade = decade;
        Ok(self.render())
    }

    /// Draw the current view from the current filtered records.
    pub fn render(&mut self) -> Rendered {
        self.tooltip = None;
        match self.state.view {
            View::Map => {
                self.display = Display::map();
                Rendered::Map(self.map.draw(&self.filtered))
            }
            view => {
                let groups = self.groups_for(view);
                self.show_chart(view, groups)
            }
        }
    }

    fn groups_for(&self, view: View) -> Vec<GroupedCount> {
        match view {
            View::Neighbourhood => group_counts(
                &self.filtered,
                |r| r.neighbourhood.clone(),
                SortOrder::CountDescending,
            ),
            View::Type => {
                group_counts(&self.filtered, |r| r.art_type.clone(), SortOrder::CountDescending)
            }
            View::Year => group_counts(&self.filtered, record_decade, SortOrder::KeyAscending)
                .into_iter()
                .filter(|g| g.key != UNKNOWN)
                .collect(),
            View::Map => Vec::new(),
        }
    }

    fn show_chart(&mut self, view: View, groups: Vec<GroupedCount>) -> Rendered {
        self.map.hide();
        self.display = Display::chart();
        let label = view.label();
        let svg = self.chart.draw(&groups, label);
        Rendered::Chart {
            view,
            label: label.to_string(),
            groups,
            svg,
        }
    }

    /// Pointer moved over the chart canvas.
    pub fn pointer_moved(&mut self, x: f64, y: f64) -> Option<Tooltip> {
        self.tooltip = if self.display.chart_visible {
            self.chart.hover(x, y)
        } else {
            None
        };
        self.tooltip.clone()
    }

    pub fn pointer_left(&mut self) {
        self.tooltip = None;
    }
}
