//! Shapes analytics rows into the JSON the dashboard's Plotly charts read.

use serde::Serialize;
use survey_db::analytics::{
    AdminSummary, AgeBracketCount, CohortCell, DailyCount, HeatmapCell, TagCount,
};

pub const WEEKDAY_LABELS: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];
pub const FUNNEL_LABELS: [&str; 3] = ["Регистрация", "Начали опрос", "Завершили опрос"];

/// Parallel label/count arrays, used by bar, line and funnel charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub counts: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapChart {
    /// 7 weekdays (Mon first) by 24 hours.
    pub z: Vec<Vec<i64>>,
    pub x: Vec<String>,
    pub y: Vec<String>,
    pub period: String,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortChart {
    pub y: Vec<String>,
    pub x: Vec<String>,
    pub z: Vec<Vec<Option<f64>>>,
    pub text: Vec<Vec<String>>,
}

pub fn funnel(summary: &AdminSummary) -> Series {
    Series {
        labels: FUNNEL_LABELS.iter().map(|l| l.to_string()).collect(),
        counts: vec![
            summary.total_users,
            summary.unique_users_started,
            summary.unique_users_completed,
        ],
    }
}

pub fn activity(rows: &[DailyCount]) -> Series {
    Series {
        labels: rows.iter().map(|r| r.date.clone()).collect(),
        counts: rows.iter().map(|r| r.count).collect(),
    }
}

pub fn tags(rows: &[TagCount]) -> Series {
    Series {
        labels: rows.iter().map(|r| r.name.clone()).collect(),
        counts: rows.iter().map(|r| r.count).collect(),
    }
}

pub fn demographics(rows: &[AgeBracketCount]) -> Series {
    Series {
        labels: rows.iter().map(|r| r.bracket.clone()).collect(),
        counts: rows.iter().map(|r| r.count).collect(),
    }
}

pub fn heatmap(cells: &[HeatmapCell], period: &str) -> HeatmapChart {
    let mut z = vec![vec![0i64; 24]; 7];
    let mut total = 0;
    for cell in cells {
        let (Some(day), hour) = (cell.weekday.checked_sub(1), cell.hour as usize) else {
            continue;
        };
        if let Some(slot) = z.get_mut(day as usize).and_then(|row| row.get_mut(hour)) {
            *slot = cell.count;
            total += cell.count;
        }
    }

    HeatmapChart {
        z,
        x: (0..24).map(|h| format!("{:02}:00", h)).collect(),
        y: WEEKDAY_LABELS.iter().map(|d| d.to_string()).collect(),
        period: period.to_string(),
        total,
    }
}

/// Cohorts as rows, month lags `M+0..M+max` as columns; gaps stay null.
pub fn cohorts(cells: &[CohortCell]) -> CohortChart {
    if cells.is_empty() {
        return CohortChart::default();
    }

    let mut labels: Vec<String> = cells.iter().map(|c| c.cohort.clone()).collect();
    labels.sort();
    labels.dedup();
    let max_lag = cells.iter().map(|c| c.month_lag.max(0)).max().unwrap_or(0) as usize;

    let mut z = vec![vec![None; max_lag + 1]; labels.len()];
    let mut text = vec![vec![String::new(); max_lag + 1]; labels.len()];
    for cell in cells {
        let Ok(row) = labels.binary_search(&cell.cohort) else {
            continue;
        };
        let Ok(col) = usize::try_from(cell.month_lag) else {
            continue;
        };
        z[row][col] = Some(cell.retention_pct);
        text[row][col] = format!("{:.1}%", cell.retention_pct);
    }

    CohortChart {
        y: labels,
        x: (0..=max_lag).map(|i| format!("M+{}", i)).collect(),
        z,
        text,
    }
}

/// JSON for embedding inside a `<script>` element.
pub fn to_script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heatmap_places_cells_by_weekday_and_hour() {
        let chart = heatmap(
            &[
                HeatmapCell { weekday: 1, hour: 0, count: 3 },
                HeatmapCell { weekday: 7, hour: 23, count: 2 },
                HeatmapCell { weekday: 9, hour: 5, count: 100 },
            ],
            "all",
        );
        assert_eq!(chart.z.len(), 7);
        assert!(chart.z.iter().all(|row| row.len() == 24));
        assert_eq!(chart.z[0][0], 3);
        assert_eq!(chart.z[6][23], 2);
        assert_eq!(chart.total, 5);
        assert_eq!(chart.x[9], "09:00");
        assert_eq!(chart.y[6], "Вс");
    }

    #[test]
    fn cohort_matrix_fills_gaps_with_null() {
        let chart = cohorts(&[
            CohortCell { cohort: "2025-02".into(), cohort_size: 4, month_lag: 0, retention_pct: 75.0 },
            CohortCell { cohort: "2025-01".into(), cohort_size: 2, month_lag: 0, retention_pct: 100.0 },
            CohortCell { cohort: "2025-01".into(), cohort_size: 2, month_lag: 2, retention_pct: 50.0 },
        ]);
        assert_eq!(chart.y, vec!["2025-01", "2025-02"]);
        assert_eq!(chart.x, vec!["M+0", "M+1", "M+2"]);
        assert_eq!(chart.z[0], vec![Some(100.0), None, Some(50.0)]);
        assert_eq!(chart.text[0][2], "50.0%");
        assert_eq!(chart.z[1][1], None);
    }

    #[test]
    fn funnel_has_three_stages() {
        let series = funnel(&AdminSummary {
            total_users: 10,
            unique_users_started: 6,
            unique_users_completed: 3,
            total_surveys: 2,
            total_responses: 9,
        });
        assert_eq!(series.labels[1], "Начали опрос");
        assert_eq!(series.counts, vec![10, 6, 3]);
    }

    #[test]
    fn script_json_cannot_close_the_tag() {
        let json = to_script_json(&vec!["</script><b>"]);
        assert!(!json.contains("</"));
    }
}
