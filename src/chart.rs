//! Bar charts rendered into an in-memory SVG document.
//!
//! The renderer keeps the geometry of the bars it last drew so pointer
//! positions can be hit-tested for the hover tooltip.

use crate::config::ChartConfig;
use crate::types::GroupedCount;
use serde::Serialize;
use std::fmt::Write;

const BAND_PADDING: f64 = 0.2;
const TICK_COUNT: f64 = 10.0;
const TICK_SIZE: f64 = 6.0;
const TOOLTIP_OFFSET: (f64, f64) = (10.0, -20.0);

/// Categorical scale mapping each key to an evenly spaced band.
#[derive(Debug, Clone)]
pub struct BandScale {
    domain: Vec<String>,
    start: f64,
    step: f64,
    bandwidth: f64,
}

impl BandScale {
    pub fn new(domain: Vec<String>, range: (f64, f64), padding: f64) -> Self {
        let n = domain.len() as f64;
        let (r0, r1) = range;
        let step = (r1 - r0) / (n - padding + 2.0 * padding).max(1.0);
        let start = r0 + (r1 - r0 - step * (n - padding)) * 0.5;
        Self {
            domain,
            start,
            step,
            bandwidth: step * (1.0 - padding),
        }
    }

    pub fn position(&self, key: &str) -> Option<f64> {
        self.domain
            .iter()
            .position(|k| k == key)
            .map(|i| self.start + self.step * i as f64)
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }
}

/// Linear scale from `[0, max]` onto a pixel range, with the upper bound
/// rounded out to a step of 1, 2 or 5 times a power of ten.
#[derive(Debug, Clone)]
pub struct LinearScale {
    max: f64,
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(max: f64, range: (f64, f64)) -> Self {
        Self { max, range }
    }

    pub fn nice(mut self) -> Self {
        let mut previous = None;
        for _ in 0..10 {
            let step = tick_step(self.max);
            if previous == Some(step) {
                break;
            }
            self.max = step.ceil_multiple(self.max);
            previous = Some(step);
        }
        self
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn scale(&self, value: f64) -> f64 {
        let (r0, r1) = self.range;
        if self.max == 0.0 {
            return r0;
        }
        r0 + (value / self.max) * (r1 - r0)
    }

    pub fn ticks(&self) -> Vec<f64> {
        let step = tick_step(self.max);
        let count = step.index_of(self.max);
        (0..=count).map(|i| step.value(i)).collect()
    }

    fn precision(&self) -> usize {
        match tick_step(self.max) {
            TickStep::Multiple(_) => 0,
            TickStep::Fraction(inverse) => inverse.log10().ceil().max(0.0) as usize,
        }
    }
}

// Sub-unit steps are kept as their inverse so multiples stay exact.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TickStep {
    Multiple(f64),
    Fraction(f64),
}

impl TickStep {
    fn ceil_multiple(self, value: f64) -> f64 {
        match self {
            TickStep::Multiple(step) => (value / step).ceil() * step,
            TickStep::Fraction(inverse) => (value * inverse).ceil() / inverse,
        }
    }

    fn index_of(self, value: f64) -> u64 {
        match self {
            TickStep::Multiple(step) => (value / step).round() as u64,
            TickStep::Fraction(inverse) => (value * inverse).round() as u64,
        }
    }

    fn value(self, index: u64) -> f64 {
        match self {
            TickStep::Multiple(step) => index as f64 * step,
            TickStep::Fraction(inverse) => index as f64 / inverse,
        }
    }
}

fn tick_step(max: f64) -> TickStep {
    if max <= 0.0 {
        return TickStep::Multiple(1.0);
    }
    let raw = max / TICK_COUNT;
    let power = raw.log10().floor();
    let error = raw / 10f64.powf(power);
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };
    if power >= 0.0 {
        TickStep::Multiple(factor * 10f64.powf(power))
    } else {
        TickStep::Fraction(10f64.powf(-power) / factor)
    }
}

/// Scalable-vector drawing surface: a sized canvas with one plot group
/// translated by the margins.
#[derive(Debug, Clone)]
pub struct ChartSurface {
    width: u32,
    height: u32,
    offset: (f64, f64),
    elements: Vec<String>,
}

impl ChartSurface {
    pub fn new(config: &ChartConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            offset: (config.margin.left as f64, config.margin.top as f64),
            elements: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn append(&mut self, element: String) {
        self.elements.push(element);
    }

    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" id="chart" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        let _ = write!(svg, r#"<g transform="translate({},{})">"#, self.offset.0, self.offset.1);
        for element in &self.elements {
            svg.push_str(element);
        }
        svg.push_str("</g></svg>");
        svg
    }
}

/// A drawn bar in canvas pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub group: GroupedCount,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bar {
    fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub left: f64,
    pub top: f64,
    pub html: String,
}

pub struct ChartRenderer {
    config: ChartConfig,
    surface: ChartSurface,
    label: String,
    bars: Vec<Bar>,
}

impl ChartRenderer {
    pub fn new(config: ChartConfig) -> Self {
        let surface = ChartSurface::new(&config);
        Self {
            config,
            surface,
            label: String::new(),
            bars: Vec::new(),
        }
    }

    fn plot_size(&self) -> (f64, f64) {
        let m = self.config.margin;
        (
            self.config.width.saturating_sub(m.left + m.right) as f64,
            self.config.height.saturating_sub(m.top + m.bottom) as f64,
        )
    }

    /// Replace the chart with one bar per group and return the SVG markup.
    pub fn draw(&mut self, groups: &[GroupedCount], label: &str) -> String {
        self.surface.clear();
        self.bars.clear();
        self.label = label.to_string();

        let (width, height) = self.plot_size();
        let keys = groups.iter().map(|g| g.key.clone()).collect();
        let x = BandScale::new(keys, (0.0, width), BAND_PADDING);
        let max = groups.iter().map(|g| g.count).max().unwrap_or(0).max(1);
        let y = LinearScale::new(max as f64, (height, 0.0)).nice();

        self.surface.append(category_axis(&x, height));
        self.surface.append(count_axis(&y));

        let (ox, oy) = self.surface.offset;
        for group in groups {
            let Some(bx) = x.position(&group.key) else { continue };
            let by = y.scale(group.count as f64);
            let bar = Bar {
                group: group.clone(),
                x: bx,
                y: by,
                width: x.bandwidth(),
                height: height - by,
            };
            self.surface.append(format!(
                r#"<rect class="bar" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}" data-key="{}" data-count="{}"></rect>"#,
                bar.x,
                bar.y,
                bar.width,
                bar.height,
                escape(&self.config.bar_color),
                escape(&group.key),
                group.count
            ));
            self.bars.push(Bar { x: bar.x + ox, y: bar.y + oy, ..bar });
        }

        self.surface.append(format!(
            r#"<text class="title" x="{:.2}" y="-10" text-anchor="middle" style="font-size: 18px">Public Art by {}</text>"#,
            width / 2.0,
            escape(label)
        ));

        self.surface.to_svg()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Tooltip for the bar under the pointer, placed just beside it.
    pub fn hover(&self, px: f64, py: f64) -> Option<Tooltip> {
        let bar = self.bars.iter().find(|b| b.contains(px, py))?;
        Some(Tooltip {
            left: px + TOOLTIP_OFFSET.0,
            top: py + TOOLTIP_OFFSET.1,
            html: format!(
                "<strong>{}:</strong> {}<br><strong>Count:</strong> {}",
                escape(&self.label),
                escape(&bar.group.key),
                bar.group.count
            ),
        })
    }
}

fn category_axis(x: &BandScale, height: f64) -> String {
    let mut axis = format!(r#"<g class="axis axis-x" transform="translate(0,{:.2})">"#, height);
    let half = x.bandwidth() / 2.0;
    for key in x.domain() {
        let Some(pos) = x.position(key) else { continue };
        let _ = write!(
            axis,
            r#"<g class="tick" transform="translate({:.2},0)"><line y2="{}" stroke="currentColor"></line><text y="9" dy="0.71em" transform="rotate(-45)" style="text-anchor: end">{}</text></g>"#,
            pos + half,
            TICK_SIZE,
            escape(key)
        );
    }
    axis.push_str("</g>");
    axis
}

fn count_axis(y: &LinearScale) -> String {
    let mut axis = String::from(r#"<g class="axis axis-y">"#);
    let precision = y.precision();
    for tick in y.ticks() {
        let _ = write!(
            axis,
            r#"<g class="tick" transform="translate(0,{:.2})"><line x2="-{}" stroke="currentColor"></line><text x="-9" dy="0.32em" text-anchor="end">{:.*}</text></g>"#,
            y.scale(tick),
            TICK_SIZE,
            precision,
            tick
        );
    }
    axis.push_str("</g>");
    axis
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn groups() -> Vec<GroupedCount> {
        vec![GroupedCount::new("Downtown", 2), GroupedCount::new("Unknown", 1)]
    }

    #[test]
    fn band_scale_pads_between_and_around_bands() {
        let x = BandScale::new(vec!["a".into(), "b".into()], (0.0, 110.0), 0.2);
        assert!(approx(x.bandwidth(), 40.0));
        assert!(approx(x.position("a").unwrap(), 10.0));
        assert!(approx(x.position("b").unwrap(), 60.0));
        assert_eq!(x.position("c"), None);
    }

    #[test]
    fn linear_scale_rounds_max_to_nice_bound() {
        assert_eq!(LinearScale::new(47.0, (100.0, 0.0)).nice().max(), 50.0);
        assert_eq!(LinearScale::new(3.0, (100.0, 0.0)).nice().max(), 3.0);
        assert_eq!(LinearScale::new(123.0, (100.0, 0.0)).nice().max(), 130.0);
        assert_eq!(LinearScale::new(10.0, (100.0, 0.0)).nice().max(), 10.0);
    }

    #[test]
    fn linear_scale_maps_zero_to_baseline() {
        let y = LinearScale::new(50.0, (400.0, 0.0));
        assert!(approx(y.scale(0.0), 400.0));
        assert!(approx(y.scale(50.0), 0.0));
        assert!(approx(y.scale(25.0), 200.0));
    }

    #[test]
    fn ticks_cover_the_domain() {
        let y = LinearScale::new(50.0, (100.0, 0.0)).nice();
        assert_eq!(y.ticks(), vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0]);
        let small = LinearScale::new(1.0, (100.0, 0.0)).nice();
        assert_eq!(small.ticks().len(), 11);
        assert_eq!(small.precision(), 1);
    }

    #[test]
    fn draw_renders_one_bar_per_group_and_title() {
        let mut chart = ChartRenderer::new(ChartConfig::default());
        let svg = chart.draw(&groups(), "Neighbourhood");
        assert_eq!(svg.matches("<rect").count(), 2);
        assert!(svg.contains("Public Art by Neighbourhood"));
        assert!(svg.contains("rotate(-45)"));
        assert!(svg.contains(r#"data-key="Downtown""#));
        assert_eq!(chart.bars().len(), 2);
        assert!(chart.bars()[0].height > chart.bars()[1].height);
    }

    #[test]
    fn draw_clears_previous_contents() {
        let mut chart = ChartRenderer::new(ChartConfig::default());
        chart.draw(&groups(), "Neighbourhood");
        let svg = chart.draw(&[GroupedCount::new("1990s", 4)], "Decade");
        assert_eq!(svg.matches("<rect").count(), 1);
        assert!(!svg.contains("Downtown"));
        assert!(svg.contains("Public Art by Decade"));
    }

    #[test]
    fn empty_groups_still_render_axes_and_title() {
        let mut chart = ChartRenderer::new(ChartConfig::default());
        let svg = chart.draw(&[], "Type");
        assert_eq!(svg.matches("<rect").count(), 0);
        assert!(svg.contains("axis-y"));
        assert!(svg.contains("Public Art by Type"));
    }

    #[test]
    fn labels_are_escaped() {
        let mut chart = ChartRenderer::new(ChartConfig::default());
        let svg = chart.draw(&[GroupedCount::new("Arts & <Crafts>", 1)], "Type");
        assert!(svg.contains("Arts &amp; &lt;Crafts&gt;"));
    }

    #[test]
    fn hover_over_bar_shows_category_and_count() {
        let mut chart = ChartRenderer::new(ChartConfig::default());
        chart.draw(&groups(), "Neighbourhood");
        let bar = chart.bars()[0].clone();
        let (px, py) = (bar.x + bar.width / 2.0, bar.y + bar.height / 2.0);

        let tooltip = chart.hover(px, py).unwrap();
        assert!(approx(tooltip.left, px + 10.0));
        assert!(approx(tooltip.top, py - 20.0));
        assert_eq!(
            tooltip.html,
            "<strong>Neighbourhood:</strong> Downtown<br><strong>Count:</strong> 2"
        );
    }

    #[test]
    fn hover_outside_bars_shows_nothing() {
        let mut chart = ChartRenderer::new(ChartConfig::default());
        chart.draw(&groups(), "Neighbourhood");
        assert_eq!(chart.hover(0.0, 0.0), None);
    }
}
