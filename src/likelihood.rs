use crate::data_types::model::{Model, MutationModel, SideModel, MISSING_ALLELE};
use crate::data_types::side::Side;
use crate::probability::{breakpoint_mass, mutation_kernel, no_mutation_survival, survival};

use log::trace;
use strum::IntoEnumIterator;

/// Depth of the "recombined onto a frequent allele" alternatives included in the likelihood
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, strum_macros::Display)]
pub enum ApproximationOrder {
    /// Exact-match terms only
    #[strum(serialize = "1")]
    First=1,
    /// Adds single recombinations onto a frequent allele
    #[strum(serialize = "2")]
    Second,
    /// Adds double recombinations and the pairwise coincidence correction
    #[strum(serialize = "3")]
    Third
}

impl ApproximationOrder {
    /// Converts a user-facing level (1-3) into an order
    pub fn from_level(level: u8) -> Option<ApproximationOrder> {
        match level {
            1 => Some(ApproximationOrder::First),
            2 => Some(ApproximationOrder::Second),
            3 => Some(ApproximationOrder::Third),
            _ => None
        }
    }
}

impl Default for ApproximationOrder {
    fn default() -> Self {
        ApproximationOrder::Third
    }
}

/// The individual assumed to carry the intact ancestral haplotype through the last shared marker
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Founder {
    /// Nobody in the sample carries it
    Absent,
    /// The individual at this index carries it
    Individual(usize)
}

impl Founder {
    fn is(&self, individual: usize) -> bool {
        *self == Founder::Individual(individual)
    }
}

/// Likelihood of one side of the sample at a fixed generation count.
/// Individuals are split into carriers of the longest shared segment (group 1) and non-carriers (group 2).
pub struct SideLikelihood<'a> {
    model: &'a Model,
    side: &'a SideModel,
    generations: u32,
    order: ApproximationOrder,
    stepwise: bool,
    /// no mutation over the longest shared segment, excluding its last marker
    carrier_no_mutation: f64,
    /// frequency of the allele at the last shared marker
    last_frequency: f64,
    /// frequency of the allele at the marker before it
    previous_frequency: f64,
    /// recombination just before the last shared marker
    single_breakpoint: f64,
    /// recombination one marker earlier
    double_breakpoint: f64
}

impl<'a> SideLikelihood<'a> {
    /// Prepares the evaluation of one side.
    /// # Arguments
    /// * `model` - the trimmed model
    /// * `side` - the side to evaluate
    /// * `generations` - number of generations since the common ancestor
    /// * `order` - depth of the frequent allele alternatives
    pub fn new(model: &'a Model, side: Side, generations: u32, order: ApproximationOrder) -> SideLikelihood<'a> {
        let side_model: &SideModel = model.side(side);
        let marker_count: i32 = side_model.marker_count();
        let fractions: &[f64] = side_model.fractions();
        let (last_frequency, previous_frequency) = if marker_count > 2 {
            (side_model.frequency(marker_count), side_model.frequency(marker_count - 1))
        } else {
            (0.0, 0.0)
        };
        SideLikelihood {
            model,
            side: side_model,
            generations,
            order,
            stepwise: model.mutation_model() == MutationModel::Stepwise,
            carrier_no_mutation: no_mutation_survival(model.mutation_rate(), marker_count - 1, generations),
            last_frequency,
            previous_frequency,
            single_breakpoint: breakpoint_mass(marker_count - 1, generations, fractions),
            double_breakpoint: breakpoint_mass(marker_count - 2, generations, fractions)
        }
    }

    fn kernel(&self, rank: i32, reference_allele: i32, observed_allele: i32) -> f64 {
        mutation_kernel(
            self.model.mutation_rate(), rank, self.generations, self.side.fractions(),
            reference_allele, observed_allele, self.stepwise
        )
    }

    fn weight(&self, individual: usize) -> f64 {
        self.model.post_probability(individual)
    }

    /// Allele the group 1 carriers are compared against
    fn founder_allele(&self, founder: Founder) -> i32 {
        match founder {
            Founder::Absent => MISSING_ALLELE,
            Founder::Individual(i) => self.side.end_allele(i)
        }
    }

    /// Weighted probability that `individual` kept the founder allele at the last shared marker
    fn carrier_factor(&self, founder: Founder, individual: usize) -> f64 {
        let kernel = self.kernel(self.side.marker_count(), self.founder_allele(founder), self.side.end_allele(individual));
        (self.carrier_no_mutation * kernel).powf(self.weight(individual))
    }

    /// Individuals multiplied into the frequent allele alternatives of carrier `j`.
    /// With a founder, membership is tested on the end allele value rather than the end marker.
    fn is_companion(&self, founder: Founder, individual: usize, j: usize) -> bool {
        if individual == j {
            return false;
        }
        match founder {
            Founder::Absent => self.side.is_longest(individual),
            Founder::Individual(i) => individual != i && self.side.end_allele(individual) == self.side.marker_count()
        }
    }

    /// Individuals eligible for the pairwise coincidence correction, also tested on the end allele value.
    /// Without a founder the last individual of the sample is excluded instead.
    fn is_coincident(&self, founder: Founder, individual: usize) -> bool {
        let excluded: usize = match founder {
            Founder::Absent => self.model.individual_count() - 1,
            Founder::Individual(i) => i
        };
        individual != excluded && self.side.end_allele(individual) == self.side.marker_count()
    }

    /// Group 2: product over individuals that recombined before the last shared marker
    pub fn non_carrier_term(&self) -> f64 {
        let marker_count: i32 = self.side.marker_count();
        let fractions: &[f64] = self.side.fractions();
        let mutation_rate: f64 = self.model.mutation_rate();

        let mut likelihood: f64 = 1.0;
        for j in 0..self.model.individual_count() {
            let end_marker: i32 = self.side.end_marker(j);
            if end_marker == marker_count {
                continue;
            }

            let (p1, p2) = if end_marker > 2 {
                (self.side.frequency(end_marker), self.side.frequency(end_marker - 1))
            } else {
                (0.0, 0.0)
            };
            let no_mutation = no_mutation_survival(mutation_rate, end_marker - 1, self.generations);
            let kernel = self.kernel(end_marker, self.side.ancestral_allele(end_marker), self.side.end_allele(j));
            let exact: f64 = no_mutation * kernel;
            let term: f64 = match self.order {
                ApproximationOrder::First => exact,
                ApproximationOrder::Second => {
                    exact + p1 * breakpoint_mass(end_marker - 1, self.generations, fractions)
                },
                ApproximationOrder::Third => {
                    exact
                        + p1 * breakpoint_mass(end_marker - 1, self.generations, fractions)
                        + p1 * p2 * breakpoint_mass(end_marker - 2, self.generations, fractions)
                }
            };
            likelihood *= term.powf(self.weight(j));
        }
        likelihood
    }

    /// Order 0: every group 1 carrier (other than the founder) matches the founder allele
    pub fn exact_match_term(&self, founder: Founder) -> f64 {
        (0..self.model.individual_count())
            .filter(|&j| self.side.is_longest(j) && !founder.is(j))
            .fold(1.0, |product, j| product * self.carrier_factor(founder, j))
    }

    /// Orders 1 and 2: carrier `j` instead recombined onto a frequent allele one or two markers early.
    /// Returns both alternatives, each multiplied across the companions of `j`.
    pub fn frequent_allele_terms(&self, founder: Founder, j: usize) -> (f64, f64) {
        let weight: f64 = self.weight(j);
        let mut single: f64 = (self.carrier_no_mutation * self.last_frequency * self.single_breakpoint).powf(weight);
        let mut double: f64 = (
            self.carrier_no_mutation * self.last_frequency * self.previous_frequency * self.double_breakpoint
        ).powf(weight);
        for k in 0..self.model.individual_count() {
            if self.is_companion(founder, k, j) {
                let factor: f64 = self.carrier_factor(founder, k);
                single *= factor;
                double *= factor;
            }
        }
        (single, double)
    }

    /// Order 3: carrier `j` and a later carrier `l` both recombined onto the frequent allele.
    /// Returns the sum over every eligible `l`.
    pub fn pairwise_coincidence_term(&self, founder: Founder, j: usize) -> f64 {
        let individual_count: usize = self.model.individual_count();
        let squared: f64 = (self.carrier_no_mutation * self.last_frequency * self.single_breakpoint).powf(2.0);

        let mut total: f64 = 0.0;
        for l in (j + 1)..individual_count {
            if !self.is_coincident(founder, l) {
                continue;
            }
            let exponent: f64 = match founder {
                Founder::Absent => self.weight(l),
                Founder::Individual(_) => self.weight(l) * self.weight(j)
            };
            let mut pair: f64 = squared.powf(exponent);
            for m in 0..individual_count {
                if m != l && m != j && self.is_coincident(founder, m) {
                    pair *= self.carrier_factor(founder, m);
                }
            }
            total += pair;
        }
        total
    }

    /// Sums the order 1-3 alternatives over every group 1 carrier, truncated at the configured order
    fn alternative_terms(&self, founder: Founder) -> (f64, f64, f64) {
        let mut single_total: f64 = 0.0;
        let mut double_total: f64 = 0.0;
        let mut pairwise_total: f64 = 0.0;

        let longest_count: usize = self.side.longest_count();
        if self.order == ApproximationOrder::First || longest_count <= 1 {
            return (single_total, double_total, pairwise_total);
        }

        for j in 0..self.model.individual_count() {
            if !self.side.is_longest(j) || founder.is(j) {
                continue;
            }
            let (single, double) = self.frequent_allele_terms(founder, j);
            single_total += single;
            if self.order == ApproximationOrder::Third {
                double_total += double;
                if longest_count > 2 {
                    pairwise_total += self.pairwise_coincidence_term(founder, j);
                }
            }
        }
        (single_total, double_total, pairwise_total)
    }

    /// Group 1 with no individual carrying the ancestral haplotype
    pub fn no_ancestor_term(&self) -> f64 {
        let (single, double, pairwise) = self.alternative_terms(Founder::Absent);
        self.exact_match_term(Founder::Absent) + single + double + pairwise
    }

    /// Group 1 summed over every carrier as the candidate ancestor
    pub fn ancestor_carrier_term(&self) -> f64 {
        let marker_count: i32 = self.side.marker_count();
        let ancestor_survival: f64 = no_mutation_survival(self.model.mutation_rate(), marker_count, self.generations)
            * survival(marker_count, self.generations, self.side.fractions());

        let mut likelihood: f64 = 0.0;
        for i in 0..self.model.individual_count() {
            if !self.side.is_longest(i) {
                continue;
            }
            let founder = Founder::Individual(i);
            let ancestor_factor: f64 = ancestor_survival.powf(self.weight(i));
            let (single, double, pairwise) = self.alternative_terms(founder);
            likelihood += ancestor_factor * (self.exact_match_term(founder) + single + double + pairwise);
        }
        likelihood
    }

    /// Full likelihood of this side
    pub fn evaluate(&self) -> f64 {
        let no_ancestor: f64 = self.no_ancestor_term();
        let with_ancestor: f64 = self.ancestor_carrier_term();
        let non_carriers: f64 = self.non_carrier_term();
        trace!(
            "{} side, generation {}: no ancestor = {}, with ancestor = {}, non carriers = {}",
            self.side.side(), self.generations, no_ancestor, with_ancestor, non_carriers
        );
        (no_ancestor + with_ancestor) * non_carriers
    }
}

/// Likelihood of one side at a given generation count
pub fn side_likelihood(model: &Model, side: Side, generations: u32, order: ApproximationOrder) -> f64 {
    SideLikelihood::new(model, side, generations, order).evaluate()
}

/// Likelihood of the whole sample at a given generation count.
/// Sides with missing data contribute a factor of 1.
/// # Arguments
/// * `model` - the trimmed model
/// * `generations` - number of generations since the common ancestor, at least 1
/// * `order` - depth of the frequent allele alternatives
pub fn total_likelihood(model: &Model, generations: u32, order: ApproximationOrder) -> f64 {
    Side::iter()
        .map(|side| {
            if model.side(side).has_data() {
                side_likelihood(model, side, generations, order)
            } else {
                1.0
            }
        })
        .product()
}
