//! Elo style rating update.

/// The maximum rating change of a single game.
pub const K_FACTOR: f64 = 100.0;

/// How a game ended for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
        }
    }
}

/// The rating change for a player rated `own` after a game against `opponent`.
///
/// Both players are evaluated with the pre-game ratings; callers add the delta to the stored
/// rating.
pub fn rating_delta(own: i32, opponent: i32, outcome: Outcome) -> i32 {
    let gap = f64::from(opponent) - f64::from(own);
    let expected = 1.0 / (1.0 + 10f64.powf(gap / 400.0));
    (K_FACTOR * (outcome.score() - expected)).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_ratings_split_half_of_k() {
        assert_eq!(rating_delta(1000, 1000, Outcome::Win), 50);
        assert_eq!(rating_delta(1000, 1000, Outcome::Loss), -50);
    }

    #[test]
    fn test_favorite_gains_less_than_equal_winner() {
        let favorite = rating_delta(1400, 1000, Outcome::Win);
        let underdog = rating_delta(1000, 1400, Outcome::Win);
        assert!(favorite < 50, "favorite gained {favorite}");
        assert!(underdog > 50, "underdog gained {underdog}");
        assert!(favorite > 0);
    }

    #[test]
    fn test_400_point_gap() {
        // expected = 1 / (1 + 10) for the weaker player.
        assert_eq!(rating_delta(1000, 1400, Outcome::Win), 91);
        assert_eq!(rating_delta(1400, 1000, Outcome::Loss), -91);
        assert_eq!(rating_delta(1400, 1000, Outcome::Win), 9);
    }

    #[test]
    fn test_extreme_ratings_stay_within_k() {
        assert_eq!(rating_delta(i32::MIN, i32::MAX, Outcome::Win), 100);
        assert_eq!(rating_delta(i32::MIN, i32::MAX, Outcome::Loss), 0);
        assert_eq!(rating_delta(i32::MAX, i32::MIN, Outcome::Win), 0);
        assert_eq!(rating_delta(i32::MAX, i32::MIN, Outcome::Loss), -100);
    }
}
