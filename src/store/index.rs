//! Market to outcome-token index.
//!
//! Slots are first-wins: once a (market, outcome) slot holds a token id it is
//! never overwritten by a different id, and a token never moves between
//! slots. A slot is only freed by [`MarketTokenIndex::release`].

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::market::Outcome;

/// YES/NO token ids known for one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarketTokens {
    /// YES leg token id.
    pub yes: Option<String>,
    /// NO leg token id.
    pub no: Option<String>,
}

impl MarketTokens {
    /// Token id in one slot.
    pub fn get(&self, outcome: Outcome) -> Option<&str> {
        match outcome {
            Outcome::Yes => self.yes.as_deref(),
            Outcome::No => self.no.as_deref(),
            Outcome::Unknown => None,
        }
    }

    /// Both legs, when both are known.
    pub fn pair(&self) -> Option<(&str, &str)> {
        Some((self.yes.as_deref()?, self.no.as_deref()?))
    }

    /// Whether both slots are empty.
    pub fn is_empty(&self) -> bool {
        self.yes.is_none() && self.no.is_none()
    }

    fn slot_mut(&mut self, outcome: Outcome) -> Option<&mut Option<String>> {
        match outcome {
            Outcome::Yes => Some(&mut self.yes),
            Outcome::No => Some(&mut self.no),
            Outcome::Unknown => None,
        }
    }
}

/// Outcome of an [`MarketTokenIndex::assign`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The slot was empty and now holds the token.
    Filled,
    /// The slot already held this token.
    Unchanged,
    /// The slot or the token was already taken; nothing changed.
    Conflict,
}

/// Incrementally built `market -> {yes, no}` index with a reverse lookup.
#[derive(Debug, Default)]
pub struct MarketTokenIndex {
    markets: HashMap<String, MarketTokens>,
    tokens: HashMap<String, (String, Outcome)>,
}

impl MarketTokenIndex {
    /// Record that `token_id` is the `outcome` leg of `market_id`.
    pub fn assign(&mut self, market_id: &str, token_id: &str, outcome: Outcome) -> Assignment {
        if outcome == Outcome::Unknown {
            return Assignment::Conflict;
        }

        if let Some((known_market, known_outcome)) = self.tokens.get(token_id) {
            if known_market == market_id && *known_outcome == outcome {
                return Assignment::Unchanged;
            }
            debug!(
                market = %market_id,
                token = %token_id,
                "Token already indexed as {} of {}",
                known_outcome,
                known_market
            );
            return Assignment::Conflict;
        }

        let entry = self.markets.entry(market_id.to_string()).or_default();
        let Some(slot) = entry.slot_mut(outcome) else {
            return Assignment::Conflict;
        };
        if slot.is_some() {
            debug!(market = %market_id, token = %token_id, ?outcome, "Outcome slot already filled");
            return Assignment::Conflict;
        }

        *slot = Some(token_id.to_string());
        self.tokens
            .insert(token_id.to_string(), (market_id.to_string(), outcome));
        Assignment::Filled
    }

    /// Tokens of a market.
    pub fn find(&self, market_id: &str) -> Option<&MarketTokens> {
        self.markets.get(market_id)
    }

    /// Market and outcome a token is indexed under.
    pub fn lookup(&self, token_id: &str) -> Option<(&str, Outcome)> {
        self.tokens
            .get(token_id)
            .map(|(market, outcome)| (market.as_str(), *outcome))
    }

    /// Free the slot a token occupies. Returns the market when it is now empty.
    pub fn release(&mut self, token_id: &str) -> Option<String> {
        let (market_id, outcome) = self.tokens.remove(token_id)?;
        let tokens = self.markets.get_mut(&market_id)?;
        if let Some(slot) = tokens.slot_mut(outcome) {
            if slot.as_deref() == Some(token_id) {
                *slot = None;
            }
        }
        tokens.is_empty().then_some(market_id)
    }

    /// Drop a market and both of its slots.
    pub fn remove_market(&mut self, market_id: &str) {
        if let Some(tokens) = self.markets.remove(market_id) {
            for token in [tokens.yes, tokens.no].into_iter().flatten() {
                self.tokens.remove(&token);
            }
        }
    }

    /// Remove markets whose slots are both empty. Returns their ids.
    pub fn purge_empty(&mut self) -> Vec<String> {
        let empty: Vec<String> = self
            .markets
            .iter()
            .filter(|(_, tokens)| tokens.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &empty {
            self.markets.remove(id);
        }
        empty
    }

    /// Number of indexed markets.
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_assignment_wins() {
        let mut index = MarketTokenIndex::default();
        assert_eq!(index.assign("m", "y1", Outcome::Yes), Assignment::Filled);
        assert_eq!(index.assign("m", "y2", Outcome::Yes), Assignment::Conflict);
        assert_eq!(index.assign("m", "y1", Outcome::Yes), Assignment::Unchanged);

        assert_eq!(index.find("m").unwrap().yes.as_deref(), Some("y1"));
    }

    #[test]
    fn token_never_moves_between_slots() {
        let mut index = MarketTokenIndex::default();
        index.assign("m", "t", Outcome::Yes);
        assert_eq!(index.assign("m", "t", Outcome::No), Assignment::Conflict);
        assert_eq!(index.lookup("t"), Some(("m", Outcome::Yes)));
        assert!(index.find("m").unwrap().no.is_none());
    }

    #[test]
    fn unknown_outcome_is_not_indexed() {
        let mut index = MarketTokenIndex::default();
        assert_eq!(index.assign("m", "t", Outcome::Unknown), Assignment::Conflict);
        assert!(index.is_empty());
    }

    #[test]
    fn release_reports_orphaned_market() {
        let mut index = MarketTokenIndex::default();
        index.assign("m", "y", Outcome::Yes);
        index.assign("m", "n", Outcome::No);

        assert_eq!(index.release("y"), None);
        assert_eq!(index.release("n"), Some("m".to_string()));
        assert_eq!(index.purge_empty(), vec!["m".to_string()]);
        assert!(index.find("m").is_none());
    }

    #[test]
    fn released_slot_can_be_refilled() {
        let mut index = MarketTokenIndex::default();
        index.assign("m", "y1", Outcome::Yes);
        index.release("y1");
        assert_eq!(index.assign("m", "y2", Outcome::Yes), Assignment::Filled);
        assert_eq!(index.find("m").unwrap().pair(), None);
    }
}
