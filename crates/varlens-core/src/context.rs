//! The variance-context narrative.
//!
//! A single free-text string the user can replace wholesale. The reasoning
//! agent reads it verbatim and treats it as authoritative domain knowledge;
//! this store has no validation responsibility and never rejects input.

/// Narrative shipped with the built-in sample dataset. Explains the known
/// variances account by account so questions about them can be answered from
/// context rather than guessed at.
pub const DEFAULT_NARRATIVE: &str = "\
REVENUE VARIANCES:
Q1: Jan favorable (+$2k) due to unexpected contract renewal. Feb unfavorable (-$2k) from delayed customer payment. Mar favorable (+$5k) from new client onboarding ahead of schedule.
Q2: Apr favorable (+$2k) from seasonal uptick. May unfavorable (-$2k) due to service disruption. Jun favorable (+$5k) from promotional campaign success.
Q3: Jul unfavorable (-$2k) from summer slowdown. Aug favorable (+$2k) from new product launch. Sep favorable (+$1k) from stable operations.
Q4: Oct unfavorable (-$2k) from competitive pricing pressure. Nov favorable (+$5k) from holiday season boost. Dec favorable (+$2k) from year-end contracts.

COGS VARIANCES:
Q1-Q2: Minor variances ($1-2k) due to normal supplier price fluctuations and volume discounts.
Q3-Q4: Steady at plan or slightly favorable, reflecting improved procurement efficiency.

LABOR VARIANCES:
Generally at plan. Mar, May, Sep, and Nov show +$500-1k variances due to overtime for project deadlines and temporary staffing needs during peak periods.

FIXED COSTS VARIANCES:
Minor monthly fluctuations (+/-$200-500) from utilities rate changes, property tax adjustments, and insurance premium updates. Overall trending slightly above plan due to cost inflation.

VARIABLE COSTS VARIANCES:
Track closely with revenue patterns. Favorable when revenue is down (Feb, May, Jul, Oct) and unfavorable when revenue exceeds plan, reflecting commission structures and shipping costs.

G&A VARIANCES:
Q1-Q2: Minor variances (+/-$200-300) from office supplies, travel costs, and professional services timing.
Q3-Q4: Slightly higher activity from year-end audit preparations and strategic planning initiatives.

DEPRECIATION:
Consistently at plan. No variance as depreciation follows straight-line schedule.

INTEREST EXPENSE:
May-Dec show favorable variances ($100-300) due to early principal payments reducing outstanding debt balance and lowering interest charges.

OPERATING TAXES:
Minor variances (+/-$20-70) from quarterly true-ups based on actual revenue performance and regulatory adjustments.

INCOME TAXES:
Variances (+/-$100-250) align with revenue and profitability fluctuations. Higher revenue months show higher tax variance.";

#[derive(Debug, Clone)]
pub struct ContextStore {
    narrative: String,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self {
            narrative: DEFAULT_NARRATIVE.to_string(),
        }
    }
}

impl ContextStore {
    pub fn new(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
        }
    }

    pub fn get(&self) -> &str {
        &self.narrative
    }

    pub fn set(&mut self, narrative: impl Into<String>) {
        self.narrative = narrative.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_carries_the_sample_narrative() {
        let store = ContextStore::default();
        assert!(store.get().starts_with("REVENUE VARIANCES:"));
    }

    #[test]
    fn set_replaces_wholesale() {
        let mut store = ContextStore::default();
        store.set("Jan revenue was favorable because of a one-off contract.");
        assert_eq!(
            store.get(),
            "Jan revenue was favorable because of a one-off contract."
        );
        store.set("");
        assert_eq!(store.get(), "");
    }
}
