//! Short, deterministic aliases derived from ticket ids.
//!
//! An alias is the tail of the id's random segment, lower-cased. Because the
//! random segment is uniformly distributed over the Crockford base32 alphabet,
//! the chance that two tickets share an alias follows the birthday bound and
//! can be computed up front with [`AliasGenerator::collision_probability`].

use crate::{
    domain::ticket::{TicketId, CROCKFORD_ALPHABET},
    error::{Result, TasklineError},
};

pub const MIN_ALIAS_LENGTH: usize = 4;
pub const MAX_ALIAS_LENGTH: usize = 16;
pub const DEFAULT_ALIAS_LENGTH: usize = 6;

/// Derives aliases of a fixed length from ticket ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasGenerator {
    length: usize,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_ALIAS_LENGTH,
        }
    }
}

impl AliasGenerator {
    /// Creates a generator producing aliases of `length` characters
    ///
    /// # Errors
    ///
    /// Returns `InvalidAliasLength` unless `length` is within 4..=16.
    pub fn new(length: usize) -> Result<Self> {
        if !(MIN_ALIAS_LENGTH..=MAX_ALIAS_LENGTH).contains(&length) {
            return Err(TasklineError::InvalidAliasLength {
                length,
                min: MIN_ALIAS_LENGTH,
                max: MAX_ALIAS_LENGTH,
            });
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of distinct symbols an alias character can take
    pub fn alphabet_size() -> usize {
        CROCKFORD_ALPHABET.len()
    }

    /// Derives the alias for a ticket id
    pub fn generate(&self, id: &TicketId) -> String {
        let segment = id.random_segment();
        segment[segment.len() - self.length..].to_ascii_lowercase()
    }

    /// Parses `id` and derives its alias
    pub fn generate_from_str(&self, id: &str) -> Result<String> {
        let id: TicketId = id.parse()?;
        Ok(self.generate(&id))
    }

    /// Number of distinct aliases this generator can produce
    pub fn alias_space(&self) -> f64 {
        (Self::alphabet_size() as f64).powi(self.length as i32)
    }

    /// Birthday-bound probability that at least two of `population` aliases collide
    pub fn collision_probability(&self, population: u64) -> f64 {
        if population < 2 {
            return 0.0;
        }
        let n = population as f64;
        let exponent = n * (n - 1.0) / (2.0 * self.alias_space());
        // 1 - e^(-x), without losing precision when x is tiny
        -(-exponent).exp_m1()
    }

    /// Largest population whose collision probability stays at or below `threshold`
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless `threshold` is strictly between 0 and 1.
    pub fn recommended_population_limit(&self, threshold: f64) -> Result<u64> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(TasklineError::Config(format!(
                "collision threshold must be between 0 and 1 (exclusive), got {}",
                threshold
            )));
        }
        // Solve n(n-1)/2S = -ln(1-p) for n
        let target = -(-threshold).ln_1p();
        let limit = 0.5 + (0.25 + 2.0 * self.alias_space() * target).sqrt();
        Ok(limit.floor() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ID: &str = "01HQ3K5Z8X9ABCDEFGHJKMNPQR";

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(17)]
    #[case(26)]
    fn test_rejects_out_of_range_lengths(#[case] length: usize) {
        assert!(matches!(
            AliasGenerator::new(length),
            Err(TasklineError::InvalidAliasLength { .. })
        ));
    }

    #[rstest]
    #[case(4, "npqr")]
    #[case(6, "kmnpqr")]
    #[case(16, "9abcdefghjkmnpqr")]
    fn test_alias_is_lowercased_tail_of_random_segment(
        #[case] length: usize,
        #[case] expected: &str,
    ) {
        let generator = AliasGenerator::new(length).unwrap();
        let alias = generator.generate_from_str(ID).unwrap();
        assert_eq!(alias, expected);
        assert_eq!(alias.len(), length);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let generator = AliasGenerator::default();
        let id: TicketId = ID.parse().unwrap();
        assert_eq!(generator.generate(&id), generator.generate(&id));
        assert_eq!(generator.length(), DEFAULT_ALIAS_LENGTH);
    }

    #[test]
    fn test_distinct_ids_yield_distinct_aliases() {
        use crate::id_generation::UlidGenerator;

        let ids = UlidGenerator::new();
        let generator = AliasGenerator::new(8).unwrap();
        let a = generator.generate(&ids.generate_ticket_id().unwrap());
        let b = generator.generate(&ids.generate_ticket_id().unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let generator = AliasGenerator::default();
        assert!(generator.generate_from_str("not-an-id").is_err());
    }

    #[test]
    fn test_collision_probability_decreases_with_length() {
        let population = 10_000;
        let probabilities: Vec<f64> = (MIN_ALIAS_LENGTH..=MAX_ALIAS_LENGTH)
            .map(|l| AliasGenerator::new(l).unwrap().collision_probability(population))
            .collect();

        for pair in probabilities.windows(2) {
            assert!(pair[1] < pair[0], "{} !< {}", pair[1], pair[0]);
        }
        assert!(probabilities.iter().all(|p| *p > 0.0 && *p <= 1.0));
    }

    #[test]
    fn test_collision_probability_edges() {
        let generator = AliasGenerator::new(4).unwrap();
        assert_eq!(generator.collision_probability(0), 0.0);
        assert_eq!(generator.collision_probability(1), 0.0);
        // 32^4 ~= 1M aliases, 1M tickets almost surely collide
        assert!(generator.collision_probability(1_000_000) > 0.999);
    }

    #[test]
    fn test_population_limit_inverts_probability() {
        let generator = AliasGenerator::new(6).unwrap();
        for threshold in [0.01, 0.1, 0.5] {
            let limit = generator.recommended_population_limit(threshold).unwrap();
            assert!(generator.collision_probability(limit) <= threshold);
            assert!(generator.collision_probability(limit + 1) > threshold);
        }

        let strict = generator.recommended_population_limit(0.01).unwrap();
        let loose = generator.recommended_population_limit(0.1).unwrap();
        assert!(strict < loose);
    }

    #[test]
    fn test_population_limit_rejects_bad_threshold() {
        let generator = AliasGenerator::default();
        assert!(generator.recommended_population_limit(0.0).is_err());
        assert!(generator.recommended_population_limit(1.0).is_err());
        assert!(generator.recommended_population_limit(f64::NAN).is_err());
    }
}
