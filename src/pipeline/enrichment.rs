//! Chart enrichment: attach stable ids and rendering options.
//!
//! Pure and idempotent. Labels, series values, chart count and order are
//! never touched; ids and options are recomputed from scratch each time.

use crate::report::{
    AxisOptions, ChartOptions, ChartSpec, FontOptions, GridOptions, LegendOptions, PluginOptions,
    ScaleOptions, TitleOptions,
};

const GRID_COLOR: &str = "rgba(0,0,0,0.1)";
const TITLE_FONT_SIZE: u32 = 16;

/// Enrich every chart in order.
pub fn enrich(charts: Vec<ChartSpec>) -> Vec<ChartSpec> {
    charts
        .into_iter()
        .enumerate()
        .map(|(index, chart)| enrich_chart(index, chart))
        .collect()
}

fn enrich_chart(index: usize, mut chart: ChartSpec) -> ChartSpec {
    chart.id = Some(format!("chart-{}", index + 1));
    chart.options = Some(options_for(&chart));
    chart
}

/// Rendering options for a chart; axis options only for bar and line.
pub fn options_for(chart: &ChartSpec) -> ChartOptions {
    let scales = chart.chart_type.has_axes().then(|| ScaleOptions {
        y: AxisOptions {
            begin_at_zero: Some(true),
            grid: Some(GridOptions {
                color: GRID_COLOR.to_string(),
            }),
        },
        x: AxisOptions {
            begin_at_zero: None,
            grid: Some(GridOptions {
                color: GRID_COLOR.to_string(),
            }),
        },
    });

    ChartOptions {
        responsive: true,
        maintain_aspect_ratio: false,
        plugins: PluginOptions {
            title: Some(TitleOptions {
                display: true,
                text: chart.title.clone(),
                font: Some(FontOptions {
                    size: TITLE_FONT_SIZE,
                    weight: "bold".to_string(),
                }),
            }),
            legend: Some(LegendOptions {
                display: true,
                position: Some("bottom".to_string()),
            }),
        },
        scales,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ChartDataset, ChartType};

    fn chart(chart_type: ChartType, title: &str) -> ChartSpec {
        ChartSpec {
            id: None,
            chart_type,
            title: title.to_string(),
            labels: vec!["a".into(), "b".into()],
            datasets: vec![ChartDataset {
                label: "s".into(),
                data: vec![1.0, 2.0],
                background_color: None,
                border_color: None,
                border_width: None,
            }],
            options: None,
        }
    }

    #[test]
    fn test_ids_are_one_based_and_ordered() {
        let enriched = enrich(vec![
            chart(ChartType::Bar, "A"),
            chart(ChartType::Pie, "B"),
            chart(ChartType::Line, "C"),
        ]);
        let ids: Vec<_> = enriched.iter().filter_map(|c| c.id.as_deref()).collect();
        assert_eq!(ids, vec!["chart-1", "chart-2", "chart-3"]);
        assert_eq!(enriched[1].title, "B");
    }

    #[test]
    fn test_axis_options_only_for_cartesian() {
        let enriched = enrich(vec![
            chart(ChartType::Bar, "A"),
            chart(ChartType::Line, "B"),
            chart(ChartType::Pie, "C"),
            chart(ChartType::Doughnut, "D"),
            chart(ChartType::Radar, "E"),
        ]);
        for c in &enriched {
            let options = c.options.as_ref().expect("options attached");
            assert_eq!(options.scales.is_some(), c.chart_type.has_axes());
            assert!(!options.maintain_aspect_ratio);
        }
        let scales = enriched[0]
            .options
            .as_ref()
            .and_then(|o| o.scales.as_ref())
            .expect("bar has scales");
        assert_eq!(scales.y.begin_at_zero, Some(true));
        assert_eq!(
            scales.x.grid.as_ref().map(|g| g.color.as_str()),
            Some("rgba(0,0,0,0.1)")
        );
    }

    #[test]
    fn test_title_plugin_mirrors_chart_title() {
        let enriched = enrich(vec![chart(ChartType::Pie, "Market share")]);
        let title = enriched[0]
            .options
            .as_ref()
            .and_then(|o| o.plugins.title.as_ref())
            .expect("title plugin");
        assert_eq!(title.text, "Market share");
        assert_eq!(title.font.as_ref().map(|f| f.size), Some(16));
    }

    #[test]
    fn test_enrichment_is_idempotent_and_preserves_data() {
        let original = vec![chart(ChartType::Bar, "A"), chart(ChartType::Radar, "B")];
        let once = enrich(original.clone());
        let twice = enrich(once.clone());
        assert_eq!(once, twice);
        for (before, after) in original.iter().zip(&once) {
            assert_eq!(before.labels, after.labels);
            assert_eq!(before.datasets, after.datasets);
            assert_eq!(before.chart_type, after.chart_type);
        }
    }

    #[test]
    fn test_enriched_options_serialize_like_chartjs() {
        let enriched = enrich(vec![chart(ChartType::Line, "Trend")]);
        let json = serde_json::to_value(&enriched[0]).expect("serialize");
        assert_eq!(json["id"], "chart-1");
        assert_eq!(json["options"]["maintainAspectRatio"], false);
        assert_eq!(json["options"]["plugins"]["legend"]["position"], "bottom");
        assert_eq!(json["options"]["scales"]["y"]["beginAtZero"], true);
        assert!(json["options"]["scales"]["x"].get("beginAtZero").is_none());
    }

    #[test]
    fn test_empty_input() {
        assert!(enrich(Vec::new()).is_empty());
    }
}
