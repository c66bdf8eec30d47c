//! Text output formatting with progress bars and colors.

use quotawatch_core::{
    CredentialBundle, ModelQuotaInfo, PollStatus, PromptCreditsInfo, QuotaLevel, QuotaSnapshot,
};
use quotawatch_probe::ErrorMessages;
use quotawatch_store::{DisplayStyle, Settings};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";

// Progress bar characters
const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';

/// Width of the model label column.
const LABEL_WIDTH: usize = 28;

/// Text formatter with optional colors.
#[derive(Debug, Clone)]
pub struct TextFormatter {
    use_colors: bool,
    bar_width: usize,
    style: DisplayStyle,
    warning: f64,
    critical: f64,
    show_credits: bool,
    show_plan: bool,
}

impl TextFormatter {
    /// Creates a formatter with default display settings.
    pub fn new(use_colors: bool) -> Self {
        Self::with_settings(use_colors, &Settings::default())
    }

    /// Creates a formatter honoring the display settings.
    pub fn with_settings(use_colors: bool, settings: &Settings) -> Self {
        let (warning, critical) = settings.thresholds();
        Self {
            use_colors,
            bar_width: 10,
            style: settings.display_style,
            warning,
            critical,
            show_credits: settings.show_prompt_credits,
            show_plan: settings.show_plan_name,
        }
    }

    /// Formats a full snapshot.
    pub fn format_snapshot(&self, snapshot: &QuotaSnapshot) -> String {
        let mut lines = vec![self.bold("Antigravity Quota")];

        if self.show_plan {
            if let Some(plan) = &snapshot.plan_name {
                lines.push(format!("Plan:    {}", self.blue(plan)));
            }
        }
        if let Some(email) = &snapshot.account_email {
            lines.push(format!("Account: {}", self.cyan(email)));
        }
        if self.show_credits {
            if let Some(credits) = &snapshot.prompt_credits {
                lines.push(self.format_credits(credits));
            }
        }

        lines.push(String::new());
        if snapshot.models.is_empty() {
            lines.push(self.dim("No model quota reported"));
        } else {
            lines.extend(snapshot.models.iter().map(|m| self.format_model(m)));
            if let Some(summary) = self.format_summary(snapshot) {
                lines.push(String::new());
                lines.push(summary);
            }
        }

        lines.join("\n")
    }

    /// Names the most constrained model and counts exhausted ones.
    fn format_summary(&self, snapshot: &QuotaSnapshot) -> Option<String> {
        let lowest = snapshot.most_constrained()?;
        let remaining = lowest.remaining_percentage.unwrap_or(0.0);
        let mut line = format!("Lowest:  {} ({remaining:.0}% left)", lowest.label);
        match snapshot.exhausted_count() {
            0 => {}
            1 => line.push_str(", 1 model exhausted"),
            n => line.push_str(&format!(", {n} models exhausted")),
        }
        Some(self.dim(&line))
    }

    /// Formats one model row.
    pub fn format_model(&self, model: &ModelQuotaInfo) -> String {
        let level = model.level(self.warning, self.critical);
        let remaining = model.remaining_percentage.unwrap_or(0.0);

        let amount = if model.is_exhausted {
            self.red("exhausted")
        } else {
            let pct = self.color_for_level(level, &format!("{remaining:.0}% left"));
            match self.style {
                DisplayStyle::ProgressBar => format!("{} {pct}", self.progress_bar(remaining, level)),
                DisplayStyle::Percentage => pct,
            }
        };

        let mut line = format!(
            "{:<width$} {amount}  {}",
            model.label,
            self.dim(&format!("resets {}", model.time_until_reset_formatted)),
            width = LABEL_WIDTH
        );
        if let Some(pace) = model.pace_status {
            line.push_str(&format!("  pace: {}", pace.label()));
        }
        line
    }

    /// Formats the prompt credit line.
    fn format_credits(&self, credits: &PromptCreditsInfo) -> String {
        let level = QuotaLevel::from_remaining(credits.remaining_percentage, self.warning, self.critical);
        format!(
            "Credits: {} / {} ({})",
            format_number(credits.available),
            format_number(credits.monthly),
            self.color_for_level(level, &format!("{:.0}% left", credits.remaining_percentage))
        )
    }

    /// Formats a progress bar.
    pub fn progress_bar(&self, percent_remaining: f64, level: QuotaLevel) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let filled = ((percent_remaining.clamp(0.0, 100.0) / 100.0) * self.bar_width as f64).round() as usize;
        let empty = self.bar_width.saturating_sub(filled);

        let bar = format!(
            "{}{}",
            BAR_FULL.to_string().repeat(filled),
            BAR_EMPTY.to_string().repeat(empty)
        );

        self.color_for_level(level, &bar)
    }

    /// Formats a polling status event.
    pub fn format_status(&self, status: PollStatus) -> String {
        match status {
            PollStatus::Fetching => self.dim("Fetching quota..."),
            PollStatus::Retrying {
                retry_count,
                max_retries,
            } => self.yellow(&format!("Fetch failed, retrying ({retry_count}/{max_retries})...")),
        }
    }

    /// Formats a discovered bundle.
    pub fn format_bundle(&self, bundle: &CredentialBundle, platform: &str) -> String {
        let fallback = bundle
            .fallback_port()
            .map_or_else(|| self.dim("none"), |p| p.to_string());
        [
            format!("{} on {platform}", self.green("Language server found")),
            format!("  Connect port:  {}", bundle.connect_port),
            format!("  HTTP fallback: {fallback}"),
            format!("  CSRF token:    {}", bundle.masked_token()),
        ]
        .join("\n")
    }

    /// Formats the guidance shown when discovery fails.
    pub fn format_discovery_failure(&self, messages: &ErrorMessages) -> String {
        let mut lines = vec![self.red(&messages.process_not_found)];
        lines.push("Please make sure:".to_string());
        lines.extend(messages.requirements.iter().map(|r| format!("  • {r}")));
        lines.join("\n")
    }

    /// Formats tool availability rows.
    pub fn format_tools(&self, tools: &[(String, bool)]) -> String {
        tools
            .iter()
            .map(|(name, found)| {
                let mark = if *found { self.green("✓") } else { self.red("✗") };
                format!("  {mark} {name}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Formats an error message.
    pub fn format_error(&self, error: &str) -> String {
        format!("{}: {error}", self.red("Error"))
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_level(&self, level: QuotaLevel, text: &str) -> String {
        match level {
            QuotaLevel::Normal => self.green(text),
            QuotaLevel::Warning => self.yellow(text),
            QuotaLevel::Critical | QuotaLevel::Depleted => self.red(text),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.use_colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub(crate) fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    pub(crate) fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn blue(&self, text: &str) -> String {
        self.paint(BLUE, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

fn format_number(n: f64) -> String {
    if n >= 1_000_000.0 {
        format!("{:.1}M", n / 1_000_000.0)
    } else if n >= 1_000.0 {
        format!("{:.1}K", n / 1_000.0)
    } else {
        format!("{n:.0}")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_half() {
        let formatter = TextFormatter::new(false);
        let bar = formatter.progress_bar(50.0, QuotaLevel::Normal);
        assert_eq!(bar, "█████░░░░░");
    }

    #[test]
    fn test_progress_bar_clamps() {
        let formatter = TextFormatter::new(false);
        assert_eq!(formatter.progress_bar(140.0, QuotaLevel::Normal), "██████████");
        assert_eq!(formatter.progress_bar(-5.0, QuotaLevel::Depleted), "░░░░░░░░░░");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(500.0), "500");
        assert_eq!(format_number(1500.0), "1.5K");
        assert_eq!(format_number(1_500_000.0), "1.5M");
    }

    #[test]
    fn test_color_for_level() {
        let formatter = TextFormatter::new(true);
        assert!(formatter.color_for_level(QuotaLevel::Critical, "x").contains(RED));
        assert!(formatter.color_for_level(QuotaLevel::Warning, "x").contains(YELLOW));
        assert!(formatter.color_for_level(QuotaLevel::Normal, "x").contains(GREEN));
    }
}
