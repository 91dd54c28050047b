//! Majority-vote consensus over per-provider signals.

use quorum_types::{truncate_chars, ConsensusResult, Signal, SignalResult, VoteBreakdown};

/// Reasoning excerpt length per provider line in the narrative.
const EXCERPT_CHARS: usize = 200;

const STRONG_AGREEMENT: f64 = 0.75;
const WEAK_AGREEMENT: f64 = 0.5;
const STRONG_BOOST: f64 = 1.2;
const WEAK_DAMPEN: f64 = 0.7;

/// Combine individual results into a single consensus.
///
/// A direction wins only with a strict plurality over the opposite
/// direction; ties fall back to Neutral. Confidence is the rounded mean,
/// boosted when at least three quarters agree and dampened below half.
pub fn aggregate(results: Vec<SignalResult>) -> ConsensusResult {
    let mut votes = VoteBreakdown::default();
    for r in &results {
        votes.record(r.signal);
    }

    let signal = majority_signal(&votes);
    let confidence = adjusted_confidence(&results, &votes);
    let reasoning = narrative(signal, &votes, &results);

    tracing::info!(
        signal = %signal,
        confidence,
        providers = results.len(),
        bullish = votes.bullish,
        bearish = votes.bearish,
        neutral = votes.neutral,
        "Consensus reached"
    );

    ConsensusResult {
        consensus_signal: signal,
        consensus_confidence: confidence,
        consensus_reasoning: reasoning,
        individual_results: results,
        vote_breakdown: votes,
    }
}

fn majority_signal(votes: &VoteBreakdown) -> Signal {
    let max = votes.max();
    if max == 0 {
        Signal::Neutral
    } else if votes.bullish == max && votes.bullish > votes.bearish {
        Signal::Bullish
    } else if votes.bearish == max && votes.bearish > votes.bullish {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

fn adjusted_confidence(results: &[SignalResult], votes: &VoteBreakdown) -> u8 {
    if results.is_empty() {
        return 0;
    }
    let sum: u32 = results.iter().map(|r| u32::from(r.confidence)).sum();
    let avg = (f64::from(sum) / results.len() as f64).round();

    let strength = votes.max() as f64 / results.len().max(1) as f64;
    let adjusted = if strength >= STRONG_AGREEMENT {
        (avg * STRONG_BOOST).round().min(100.0)
    } else if strength < WEAK_AGREEMENT {
        (avg * WEAK_DAMPEN).round()
    } else {
        avg
    };
    adjusted.clamp(0.0, 100.0) as u8
}

fn narrative(signal: Signal, votes: &VoteBreakdown, results: &[SignalResult]) -> String {
    if results.is_empty() {
        return "Consensus: NEUTRAL (no provider returned a signal)".to_string();
    }

    let mut lines = vec![
        format!(
            "Consensus: {} ({}/{} providers agree)",
            signal,
            votes.max(),
            results.len()
        ),
        format!(
            "Votes: {} bullish, {} bearish, {} neutral",
            votes.bullish, votes.bearish, votes.neutral
        ),
    ];
    for r in results {
        lines.push(format!(
            "[{}] {} ({}%): {}",
            r.provider.display_name(),
            r.signal,
            r.confidence,
            truncate_chars(&r.reasoning, EXCERPT_CHARS)
        ));
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::{ParseSource, ProviderId};

    fn vote(provider: ProviderId, signal: Signal, confidence: u8) -> SignalResult {
        SignalResult {
            signal,
            confidence,
            reasoning: format!("{provider} thinks {signal}"),
            provider,
            source: ParseSource::Structured,
        }
    }

    #[test]
    fn empty_results_yield_neutral_without_signal() {
        let c = aggregate(vec![]);
        assert_eq!(c.consensus_signal, Signal::Neutral);
        assert_eq!(c.consensus_confidence, 0);
        assert_eq!(c.vote_breakdown, VoteBreakdown::default());
        assert!(!c.has_signal());
        assert!(c.consensus_reasoning.contains("no provider returned a signal"));
    }

    #[test]
    fn unanimous_bullish_is_boosted() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Bullish, 80),
            vote(ProviderId::Anthropic, Signal::Bullish, 70),
        ]);
        assert_eq!(c.consensus_signal, Signal::Bullish);
        // avg 75, strength 1.0
        assert_eq!(c.consensus_confidence, 90);
    }

    #[test]
    fn boost_is_capped_at_100() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Bearish, 95),
            vote(ProviderId::Groq, Signal::Bearish, 95),
        ]);
        assert_eq!(c.consensus_signal, Signal::Bearish);
        assert_eq!(c.consensus_confidence, 100);
    }

    #[test]
    fn three_of_four_rounds_half_up_then_boosts() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Bullish, 80),
            vote(ProviderId::Anthropic, Signal::Bullish, 80),
            vote(ProviderId::Gemini, Signal::Bullish, 80),
            vote(ProviderId::Groq, Signal::Neutral, 50),
        ]);
        assert_eq!(c.consensus_signal, Signal::Bullish);
        // avg 72.5 -> 73, strength 0.75 -> 87.6 -> 88
        assert_eq!(c.consensus_confidence, 88);
    }

    #[test]
    fn two_two_directional_tie_is_neutral() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Bullish, 60),
            vote(ProviderId::Anthropic, Signal::Bullish, 60),
            vote(ProviderId::Gemini, Signal::Bearish, 60),
            vote(ProviderId::Groq, Signal::Bearish, 60),
        ]);
        assert_eq!(c.consensus_signal, Signal::Neutral);
        // strength exactly 0.5 is left unchanged
        assert_eq!(c.consensus_confidence, 60);
    }

    #[test]
    fn plurality_over_neutral_still_wins_direction() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Bearish, 70),
            vote(ProviderId::Anthropic, Signal::Neutral, 40),
            vote(ProviderId::Gemini, Signal::Bearish, 70),
        ]);
        assert_eq!(c.consensus_signal, Signal::Bearish);
        // avg 60, strength 0.67 -> unchanged
        assert_eq!(c.consensus_confidence, 60);
    }

    #[test]
    fn directional_tie_with_neutral_majority_is_neutral() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Neutral, 50),
            vote(ProviderId::Anthropic, Signal::Neutral, 50),
            vote(ProviderId::Gemini, Signal::Bullish, 90),
        ]);
        assert_eq!(c.consensus_signal, Signal::Neutral);
    }

    #[test]
    fn half_agreement_is_not_dampened() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Bullish, 60),
            vote(ProviderId::Anthropic, Signal::Bullish, 60),
            vote(ProviderId::Gemini, Signal::Bearish, 60),
            vote(ProviderId::Groq, Signal::Neutral, 60),
        ]);
        assert_eq!(c.consensus_signal, Signal::Bullish);
        assert_eq!(c.consensus_confidence, 60);
    }

    #[test]
    fn three_way_split_is_dampened() {
        let c = aggregate(vec![
            vote(ProviderId::OpenAi, Signal::Bullish, 80),
            vote(ProviderId::Anthropic, Signal::Bearish, 80),
            vote(ProviderId::Gemini, Signal::Neutral, 80),
        ]);
        // strength 1/3: 80 * 0.7 = 56
        assert_eq!(c.consensus_signal, Signal::Neutral);
        assert_eq!(c.consensus_confidence, 56);
    }

    #[test]
    fn vote_sum_matches_result_count() {
        let results = vec![
            vote(ProviderId::OpenAi, Signal::Bullish, 10),
            vote(ProviderId::Anthropic, Signal::Neutral, 20),
            vote(ProviderId::Gemini, Signal::Bearish, 30),
            vote(ProviderId::Groq, Signal::Bearish, 40),
        ];
        let c = aggregate(results);
        assert_eq!(c.vote_breakdown.total(), c.individual_results.len());
        assert!(c.consensus_confidence <= 100);
    }

    #[test]
    fn narrative_lists_every_provider() {
        let long = "x".repeat(500);
        let mut r = vote(ProviderId::Gemini, Signal::Bearish, 65);
        r.reasoning = long;
        let c = aggregate(vec![vote(ProviderId::OpenAi, Signal::Bearish, 75), r]);

        let lines: Vec<&str> = c.consensus_reasoning.lines().collect();
        assert_eq!(lines[0], "Consensus: BEARISH (2/2 providers agree)");
        assert_eq!(lines[1], "Votes: 0 bullish, 2 bearish, 0 neutral");
        assert_eq!(lines[2], "[OpenAI] BEARISH (75%): openai thinks BEARISH");
        assert!(lines[3].starts_with("[Gemini] BEARISH (65%): "));
        assert_eq!(lines[3].len(), "[Gemini] BEARISH (65%): ".len() + 200);
    }
}
