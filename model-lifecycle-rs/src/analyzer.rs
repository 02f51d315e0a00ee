// model-lifecycle-rs/src/analyzer.rs
// Performance analysis over user feedback.
//
// Analysis is total: an empty window or an unavailable feedback store yields
// a well-formed empty report instead of an error. `try_analyze` exists for
// callers (the monitor) that need to distinguish store failures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::feedback::{FeedbackStore, FeedbackStoreError, TimeRange};
use crate::model::FeedbackRecord;

/// Minimum number of rated records before a trend is reported.
pub const MIN_TREND_SAMPLES: usize = 10;
/// Maximum number of issues kept on a report.
pub const MAX_REPORTED_ISSUES: usize = 10;
/// Upper bound of the confidence score after rounding.
pub const MAX_CONFIDENCE: f64 = 0.99;

const TREND_STRONG_DELTA: f64 = 0.5;
const TREND_SLIGHT_DELTA: f64 = 0.1;
const CONFIDENCE_VOLUME_SCALE: f64 = 50.0;

/// Direction of the average rating across the analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceTrend {
    ImprovingStrong,
    ImprovingSlight,
    Stable,
    DecliningSlight,
    DecliningStrong,
    Undetermined,
}

/// Fixed taxonomy of feedback issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    Inaccuracy,
    Unclear,
    InsufficientDetail,
    Irrelevant,
}

impl IssueCategory {
    /// Match order; the first category whose keywords hit wins.
    pub const ALL: [IssueCategory; 4] = [
        IssueCategory::Inaccuracy,
        IssueCategory::Unclear,
        IssueCategory::InsufficientDetail,
        IssueCategory::Irrelevant,
    ];

    /// Arabic keywords used by the platform's learners, plus English equivalents.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            IssueCategory::Inaccuracy => &[
                "خطأ",
                "غير صحيح",
                "معلومات خاطئة",
                "غير دقيق",
                "wrong",
                "incorrect",
                "inaccurate",
                "false information",
                "mistake",
            ],
            IssueCategory::Unclear => &[
                "غير واضح",
                "مبهم",
                "صعب الفهم",
                "معقد",
                "unclear",
                "not clear",
                "confusing",
                "vague",
                "hard to understand",
                "complicated",
            ],
            IssueCategory::InsufficientDetail => &[
                "ناقص",
                "محتاج معلومات",
                "غير كافي",
                "مختصر",
                "incomplete",
                "missing",
                "not enough",
                "insufficient",
                "too short",
            ],
            IssueCategory::Irrelevant => &[
                "غير مناسب",
                "لا ينطبق",
                "خارج الموضوع",
                "غير ذي صلة",
                "irrelevant",
                "not relevant",
                "off topic",
                "off-topic",
                "unrelated",
            ],
        }
    }

    /// Classify a free-text note, case-insensitively.
    pub fn classify(note: &str) -> Option<IssueCategory> {
        let lower = note.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|cat| cat.keywords().iter().any(|kw| lower.contains(kw)))
    }
}

/// A low-rated feedback note matched to an issue category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedIssue {
    pub category: IssueCategory,
    pub note: String,
    pub rating: u8,
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
}

/// Percentage of each star value among rated records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingDistribution {
    pub one_star: f64,
    pub two_star: f64,
    pub three_star: f64,
    pub four_star: f64,
    pub five_star: f64,
}

impl RatingDistribution {
    pub fn from_ratings(ratings: &[u8]) -> Self {
        if ratings.is_empty() {
            return Self::default();
        }
        let total = ratings.len() as f64;
        let pct = |star: u8| ratings.iter().filter(|r| **r == star).count() as f64 / total * 100.0;

        Self {
            one_star: pct(1),
            two_star: pct(2),
            three_star: pct(3),
            four_star: pct(4),
            five_star: pct(5),
        }
    }

    pub fn percent(&self, star: u8) -> f64 {
        match star {
            1 => self.one_star,
            2 => self.two_star,
            3 => self.three_star,
            4 => self.four_star,
            5 => self.five_star,
            _ => 0.0,
        }
    }
}

/// Snapshot of model performance over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub model_type: String,
    pub window: TimeRange,
    pub total_feedback: usize,
    pub rated_feedback: usize,
    pub average_rating: f64,
    pub rating_distribution: RatingDistribution,
    pub common_issues: Vec<IdentifiedIssue>,
    pub trend: PerformanceTrend,
    pub confidence_score: f64,
    pub generated_at: DateTime<Utc>,
}

impl PerformanceReport {
    pub fn empty(model_type: &str, window: TimeRange) -> Self {
        Self {
            model_type: model_type.to_string(),
            window,
            total_feedback: 0,
            rated_feedback: 0,
            average_rating: 0.0,
            rating_distribution: RatingDistribution::default(),
            common_issues: Vec::new(),
            trend: PerformanceTrend::Undetermined,
            confidence_score: 0.0,
            generated_at: Utc::now(),
        }
    }
}

/// Computes performance reports from the feedback store.
pub struct PerformanceAnalyzer {
    store: Arc<dyn FeedbackStore + Send + Sync>,
    default_window_days: i64,
}

impl PerformanceAnalyzer {
    pub fn new(store: Arc<dyn FeedbackStore + Send + Sync>, default_window_days: i64) -> Self {
        Self {
            store,
            default_window_days,
        }
    }

    pub fn default_window(&self, now: DateTime<Utc>) -> TimeRange {
        TimeRange::last_days(self.default_window_days, now)
    }

    /// Analyze `model_type`; never fails.
    #[instrument(name = "analyze_performance", skip_all, fields(model_type = %model_type))]
    pub async fn analyze(&self, model_type: &str, window: Option<TimeRange>) -> PerformanceReport {
        let window = window.unwrap_or_else(|| self.default_window(Utc::now()));
        match self.try_analyze(model_type, Some(window)).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(error = %err, "feedback query failed; returning empty report");
                PerformanceReport::empty(model_type, window)
            }
        }
    }

    /// Analyze `model_type`, surfacing feedback store failures.
    pub async fn try_analyze(
        &self,
        model_type: &str,
        window: Option<TimeRange>,
    ) -> Result<PerformanceReport, FeedbackStoreError> {
        let window = window.unwrap_or_else(|| self.default_window(Utc::now()));
        let records = self.store.query(model_type, window).await?;
        let report = build_report(model_type, window, &records);

        tracing::debug!(
            total = report.total_feedback,
            average = report.average_rating,
            confidence = report.confidence_score,
            trend = ?report.trend,
            issues = report.common_issues.len(),
            "performance report computed"
        );
        Ok(report)
    }
}

/// Build a report from raw records. Records of other model types or outside
/// the window are ignored.
pub fn build_report(
    model_type: &str,
    window: TimeRange,
    records: &[FeedbackRecord],
) -> PerformanceReport {
    let relevant: Vec<&FeedbackRecord> = records
        .iter()
        .filter(|r| r.model_type == model_type && window.contains(r.created_at))
        .collect();

    if relevant.is_empty() {
        return PerformanceReport::empty(model_type, window);
    }

    let mut rated: Vec<(DateTime<Utc>, u8)> = relevant
        .iter()
        .filter_map(|r| r.valid_rating().map(|rating| (r.created_at, rating)))
        .collect();
    rated.sort_by_key(|(ts, _)| *ts);
    let ratings: Vec<u8> = rated.iter().map(|(_, r)| *r).collect();
    let average_rating = mean(&ratings);

    PerformanceReport {
        model_type: model_type.to_string(),
        window,
        total_feedback: relevant.len(),
        rated_feedback: ratings.len(),
        average_rating,
        rating_distribution: RatingDistribution::from_ratings(&ratings),
        common_issues: identify_issues(&relevant),
        trend: classify_trend(&ratings),
        confidence_score: confidence_score(average_rating, ratings.len()),
        generated_at: Utc::now(),
    }
}

/// Match low-rated notes against the taxonomy; newest first, capped.
pub fn identify_issues(records: &[&FeedbackRecord]) -> Vec<IdentifiedIssue> {
    let mut issues: Vec<IdentifiedIssue> = records
        .iter()
        .filter_map(|r| {
            let rating = r.valid_rating().filter(|rating| *rating < 3)?;
            let note = r.note.as_deref()?;
            let category = IssueCategory::classify(note)?;
            Some(IdentifiedIssue {
                category,
                note: note.to_string(),
                rating,
                timestamp: r.created_at,
                message_id: r.message_id.clone(),
            })
        })
        .collect();

    issues.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    issues.truncate(MAX_REPORTED_ISSUES);
    issues
}

/// Trend of chronologically ordered ratings.
pub fn classify_trend(chronological: &[u8]) -> PerformanceTrend {
    if chronological.len() < MIN_TREND_SAMPLES {
        return PerformanceTrend::Undetermined;
    }

    let (first, second) = chronological.split_at(chronological.len() / 2);
    let diff = mean(second) - mean(first);

    if diff > TREND_STRONG_DELTA {
        PerformanceTrend::ImprovingStrong
    } else if diff > TREND_SLIGHT_DELTA {
        PerformanceTrend::ImprovingSlight
    } else if diff >= -TREND_SLIGHT_DELTA {
        PerformanceTrend::Stable
    } else if diff >= -TREND_STRONG_DELTA {
        PerformanceTrend::DecliningSlight
    } else {
        PerformanceTrend::DecliningStrong
    }
}

/// `(mean / 5) * (1 - exp(-n / 50))`, rounded to two decimals and kept below 1.
pub fn confidence_score(mean_rating: f64, rated_count: usize) -> f64 {
    if rated_count == 0 {
        return 0.0;
    }
    let volume = 1.0 - (-(rated_count as f64) / CONFIDENCE_VOLUME_SCALE).exp();
    let raw = (mean_rating / 5.0) * volume;
    let rounded = (raw * 100.0).round() / 100.0;
    rounded.clamp(0.0, MAX_CONFIDENCE)
}

fn mean(values: &[u8]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window() -> TimeRange {
        TimeRange::last_days(30, Utc::now())
    }

    fn rec(rating: Option<u8>, note: Option<&str>, minutes_ago: i64) -> FeedbackRecord {
        FeedbackRecord::new(
            "nlp",
            rating,
            note.map(str::to_string),
            Utc::now() - Duration::minutes(minutes_ago),
            format!("m-{minutes_ago}"),
        )
    }

    #[test]
    fn empty_window_yields_empty_report() {
        let report = build_report("nlp", window(), &[]);
        assert_eq!(report.total_feedback, 0);
        assert_eq!(report.confidence_score, 0.0);
        assert_eq!(report.trend, PerformanceTrend::Undetermined);
        assert!(report.common_issues.is_empty());
        assert_eq!(report.rating_distribution, RatingDistribution::default());
    }

    #[test]
    fn foreign_model_type_records_are_ignored() {
        let mut other = rec(Some(1), None, 5);
        other.model_type = "translation".to_string();
        let report = build_report("nlp", window(), &[other]);
        assert_eq!(report.total_feedback, 0);
    }

    #[test]
    fn unrated_records_count_in_total_but_not_distribution() {
        let records = vec![rec(Some(5), None, 3), rec(None, None, 2), rec(Some(3), None, 1)];
        let report = build_report("nlp", window(), &records);

        assert_eq!(report.total_feedback, 3);
        assert_eq!(report.rated_feedback, 2);
        assert_eq!(report.average_rating, 4.0);
        assert_eq!(report.rating_distribution.percent(5), 50.0);
        assert_eq!(report.rating_distribution.percent(3), 50.0);
        assert_eq!(report.rating_distribution.percent(1), 0.0);
    }

    #[test]
    fn trend_needs_ten_rated_records() {
        for n in 0..MIN_TREND_SAMPLES {
            let mut ratings = vec![1u8; n / 2];
            ratings.extend(vec![5u8; n - n / 2]);
            assert_eq!(classify_trend(&ratings), PerformanceTrend::Undetermined);
        }
    }

    #[test]
    fn trend_thresholds() {
        let series = |first: u8, second: u8| {
            let mut v = vec![first; 5];
            v.extend(vec![second; 5]);
            v
        };
        assert_eq!(classify_trend(&series(3, 4)), PerformanceTrend::ImprovingStrong);
        assert_eq!(classify_trend(&series(4, 4)), PerformanceTrend::Stable);
        assert_eq!(classify_trend(&series(4, 3)), PerformanceTrend::DecliningStrong);

        // +0.2 and -0.2 shifts.
        let slight_up = vec![3, 3, 3, 3, 3, 3, 3, 3, 3, 4];
        assert_eq!(classify_trend(&slight_up), PerformanceTrend::ImprovingSlight);
        let slight_down = vec![4, 3, 3, 3, 3, 3, 3, 3, 3, 3];
        assert_eq!(classify_trend(&slight_down), PerformanceTrend::DecliningSlight);
    }

    #[test]
    fn confidence_is_monotonic_and_bounded() {
        let mut prev = 0.0;
        for n in 0..500 {
            let c = confidence_score(4.0, n);
            assert!(c >= prev, "non-decreasing in sample count");
            assert!((0.0..1.0).contains(&c));
            prev = c;
        }

        let mut prev = 0.0;
        for tenth in 10..=50 {
            let c = confidence_score(f64::from(tenth) / 10.0, 60);
            assert!(c >= prev, "non-decreasing in mean rating");
            prev = c;
        }

        assert!(confidence_score(5.0, 10_000) < 1.0);
        assert_eq!(confidence_score(5.0, 0), 0.0);
    }

    #[test]
    fn issues_first_match_wins_and_only_low_ratings_count() {
        let records = vec![
            rec(Some(1), Some("الشرح غير واضح وغير صحيح"), 10),
            rec(Some(2), Some("This answer is wrong and confusing"), 9),
            rec(Some(4), Some("غير واضح"), 8),
            rec(Some(2), Some("great"), 7),
            rec(Some(1), None, 6),
        ];
        let refs: Vec<&FeedbackRecord> = records.iter().collect();
        let issues = identify_issues(&refs);

        assert_eq!(issues.len(), 2);
        // Newest first; both notes hit inaccuracy before unclear.
        assert_eq!(issues[0].category, IssueCategory::Inaccuracy);
        assert_eq!(issues[0].message_id, "m-9");
        assert_eq!(issues[1].category, IssueCategory::Inaccuracy);
    }

    #[test]
    fn issues_are_capped_to_most_recent() {
        let records: Vec<FeedbackRecord> = (0..15)
            .map(|i| rec(Some(1), Some("unclear explanation"), i))
            .collect();
        let refs: Vec<&FeedbackRecord> = records.iter().collect();
        let issues = identify_issues(&refs);

        assert_eq!(issues.len(), MAX_REPORTED_ISSUES);
        assert_eq!(issues[0].message_id, "m-0");
        assert!(issues.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn classify_matches_each_category() {
        assert_eq!(IssueCategory::classify("معلومات خاطئة"), Some(IssueCategory::Inaccuracy));
        assert_eq!(IssueCategory::classify("VAGUE"), Some(IssueCategory::Unclear));
        assert_eq!(
            IssueCategory::classify("الإجابة ناقص"),
            Some(IssueCategory::InsufficientDetail)
        );
        assert_eq!(IssueCategory::classify("off-topic"), Some(IssueCategory::Irrelevant));
        assert_eq!(IssueCategory::classify("thanks"), None);
    }
}
