//! Chart and report rendering.
//!
//! The HTML renderer is a thin adapter over ApexCharts: it plots each
//! package's `delta` series against the shared date axis. JSON emits the
//! chart data verbatim; Markdown summarizes each series in tables.

use crate::config::ChartConfig;
use crate::models::{Anomaly, ChartData, Metric, Report, ReportMetadata, SeriesSummary};
use anyhow::Result;
use serde_json::{json, Value};

const APEXCHARTS_CDN: &str = "https://cdn.jsdelivr.net/npm/apexcharts";

/// ApexCharts series: one per package, daily downloads under its display name.
pub fn chart_series(chart: &ChartData) -> Vec<Value> {
    chart
        .series
        .values()
        .map(|series| {
            json!({
                "name": series.name,
                "data": series.metric(Metric::Delta),
            })
        })
        .collect()
}

/// ApexCharts options for a zoomable line chart over the date axis.
pub fn chart_options(chart: &ChartData, config: &ChartConfig) -> Value {
    json!({
        "chart": {
            "type": "line",
            "height": config.height,
            "stacked": false,
            "zoom": {
                "type": "x",
                "enabled": true,
                "autoScaleYaxis": true,
            },
            "toolbar": {
                "autoSelected": "zoom",
            },
        },
        "series": chart_series(chart),
        "dataLabels": {
            "enabled": false,
        },
        "title": {
            "text": config.title,
            "align": "center",
        },
        "yaxis": {
            "title": {
                "text": "Downloads",
            },
        },
        "xaxis": {
            "type": "datetime",
            "categories": chart.dates,
        },
        "tooltip": {
            "shared": false,
        },
    })
}

/// Generate a self-contained HTML page rendering the chart.
pub fn generate_html_report(chart: &ChartData, config: &ChartConfig) -> Result<String> {
    let options = serde_json::to_string(&chart_options(chart, config))?;
    // Keep the JSON from closing the surrounding <script> element.
    let options = options.replace("</", "<\\/");

    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    page.push_str("<meta charset=\"utf-8\">\n");
    page.push_str(&format!("<title>{}</title>\n", escape_html(&config.title)));
    page.push_str(&format!("<script src=\"{}\"></script>\n", APEXCHARTS_CDN));
    page.push_str("</head>\n<body>\n");
    page.push_str("<div id=\"chart\"></div>\n");
    page.push_str("<script>\n");
    page.push_str(&format!("const options = {};\n", options));
    page.push_str("new ApexCharts(document.querySelector(\"#chart\"), options).render();\n");
    page.push_str("</script>\n</body>\n</html>\n");

    Ok(page)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Generate the chart data as pretty-printed JSON.
pub fn generate_json_report(chart: &ChartData) -> Result<String> {
    serde_json::to_string_pretty(chart).map_err(Into::into)
}

/// Generate a Markdown summary of the report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Download Statistics\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_packages_section(&report.summaries));
    output.push_str(&generate_anomalies_section(&report.anomalies));

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.base_url));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Packages:** {}\n", metadata.packages));
    section.push_str(&format!("- **Days:** {}\n", metadata.days));
    if metadata.anomalies > 0 {
        section.push_str(&format!("- **Anomalies:** {}\n", metadata.anomalies));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_packages_section(summaries: &[SeriesSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Packages\n\n");

    if summaries.is_empty() {
        section.push_str("No packages were listed in the manifest.\n\n");
        return section;
    }

    section.push_str("| Package | Coverage | Latest Total | Downloads in Range | Peak Day | Anomalies |\n");
    section.push_str("|:---|:---|---:|---:|:---|---:|\n");

    for summary in summaries {
        let coverage = match (&summary.first_date, &summary.last_date) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "no data".to_string(),
        };
        let latest = summary
            .latest_total
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        let peak = summary
            .peak
            .as_ref()
            .map(|(date, downloads)| format!("{} (+{})", date, downloads))
            .unwrap_or_else(|| "-".to_string());

        section.push_str(&format!(
            "| {} (`{}`) | {} | {} | {} | {} | {} |\n",
            summary.name,
            summary.package,
            coverage,
            latest,
            summary.downloads_in_range,
            peak,
            summary.anomalies
        ));
    }
    section.push('\n');

    section
}

fn generate_anomalies_section(anomalies: &[Anomaly]) -> String {
    if anomalies.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Anomalies\n\n");
    section.push_str("Days where the reported cumulative total decreased. ");
    section.push_str("These days are left blank in the chart.\n\n");
    section.push_str("| Package | Date | Previous | Reported |\n");
    section.push_str("|:---|:---|---:|---:|\n");

    for anomaly in anomalies {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            anomaly.package, anomaly.date, anomaly.previous, anomaly.current
        ));
    }
    section.push('\n');

    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChartSeries;
    use chrono::Utc;

    fn create_test_chart() -> ChartData {
        let series = ChartSeries {
            name: "Curse Forge Mod".to_string(),
            metrics: [
                (Metric::Total, vec![Some(100), None, Some(130)]),
                (Metric::Delta, vec![None, None, Some(30)]),
            ]
            .into_iter()
            .collect(),
        };

        ChartData {
            dates: vec![
                "2021-01-01".to_string(),
                "2021-01-02".to_string(),
                "2021-01-03".to_string(),
            ],
            series: [("curse-forge-mod".to_string(), series)]
                .into_iter()
                .collect(),
        }
    }

    fn create_test_report() -> Report {
        let chart = create_test_chart();
        let anomalies = vec![Anomaly {
            package: "curse-forge-mod".to_string(),
            date: "2021-01-02".to_string(),
            previous: 100,
            current: 90,
        }];

        Report {
            metadata: ReportMetadata {
                base_url: "https://stats.example.com".to_string(),
                generated_at: Utc::now(),
                packages: 1,
                days: chart.dates.len(),
                anomalies: anomalies.len(),
                duration_seconds: 1.5,
            },
            summaries: crate::analysis::summarize(&chart, &anomalies),
            chart,
            anomalies,
        }
    }

    #[test]
    fn test_chart_series_plots_delta() {
        let series = chart_series(&create_test_chart());

        assert_eq!(
            series,
            vec![json!({"name": "Curse Forge Mod", "data": [null, null, 30]})]
        );
    }

    #[test]
    fn test_chart_options() {
        let chart = create_test_chart();
        let options = chart_options(&chart, &ChartConfig::default());

        assert_eq!(options["chart"]["type"], "line");
        assert_eq!(options["chart"]["zoom"]["enabled"], true);
        assert_eq!(options["xaxis"]["type"], "datetime");
        assert_eq!(options["xaxis"]["categories"][2], "2021-01-03");
        assert_eq!(options["title"]["text"], "Downloads");
    }

    #[test]
    fn test_generate_html_report() {
        let config = ChartConfig {
            title: "Mods <2021>".to_string(),
            height: 400,
        };
        let html = generate_html_report(&create_test_chart(), &config).unwrap();

        assert!(html.contains("<title>Mods &lt;2021&gt;</title>"));
        assert!(html.contains(APEXCHARTS_CDN));
        assert!(html.contains("\"Curse Forge Mod\""));
        assert!(html.contains("[null,null,30]"));
        assert!(html.contains("\"2021-01-01\""));
        assert!(html.contains("\"height\":400"));
    }

    #[test]
    fn test_html_report_escapes_script_close() {
        let mut chart = create_test_chart();
        if let Some(series) = chart.series.get_mut("curse-forge-mod") {
            series.name = "</script>".to_string();
        }

        let html = generate_html_report(&chart, &ChartConfig::default()).unwrap();

        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn test_generate_json_report() {
        let chart = create_test_chart();
        let json = generate_json_report(&chart).unwrap();

        assert!(json.contains("\"dates\""));
        assert!(json.contains("\"delta\""));
        let parsed: ChartData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, chart);
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report());

        assert!(markdown.contains("# Download Statistics"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("https://stats.example.com"));
        assert!(markdown.contains("Curse Forge Mod (`curse-forge-mod`)"));
        assert!(markdown.contains("2021-01-03 (+30)"));
        assert!(markdown.contains("## Anomalies"));
        assert!(markdown.contains("| `curse-forge-mod` | 2021-01-02 | 100 | 90 |"));
    }

    #[test]
    fn test_packages_section_empty() {
        let section = generate_packages_section(&[]);
        assert!(section.contains("No packages"));
    }
}
