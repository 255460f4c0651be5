/// Probability that no recombination occurred between the mutation and the marker at `rank` over `generations` meioses.
/// Ranks at or below zero have no shared segment and return 0.
/// # Arguments
/// * `rank` - 1-based marker position
/// * `generations` - number of generations since the common ancestor
/// * `fractions` - recombination fractions indexed by marker position
pub fn survival(rank: i32, generations: u32, fractions: &[f64]) -> f64 {
    if rank <= 0 {
        0.0
    } else {
        (1.0 - fractions[rank as usize]).powf(generations as f64)
    }
}

/// Probability that the first recombination falls between markers `rank-1` and `rank`.
/// Ranks at or below one return 0.
pub fn breakpoint_mass(rank: i32, generations: u32, fractions: &[f64]) -> f64 {
    if rank <= 1 {
        0.0
    } else {
        survival(rank - 1, generations, fractions) - survival(rank, generations, fractions)
    }
}

/// Probability that no mutation occurred on the `rank-1` markers over `generations`.
/// The exponent is signed, so `rank = 0` yields a value above 1.
pub fn no_mutation_survival(mutation_rate: f64, rank: i32, generations: u32) -> f64 {
    let exponent: i64 = i64::from(generations) * (i64::from(rank) - 1);
    (1.0 - mutation_rate).powf(exponent as f64)
}

/// Probability of observing `observed_allele` at the marker at `rank` given the haplotype carried `reference_allele`.
/// Combines a recombination just before the marker with a mutation at the marker on an intact segment.
/// If either allele is negative (missing), only the recombination term remains.
/// # Arguments
/// * `mutation_rate` - per-generation mutation probability
/// * `rank` - 1-based marker position
/// * `generations` - number of generations since the common ancestor
/// * `fractions` - recombination fractions indexed by marker position
/// * `reference_allele` - allele expected at this marker (ancestral or another carrier's end allele)
/// * `observed_allele` - allele observed at this marker
/// * `stepwise` - if true, the mutation probability is Poisson in the repeat-count distance
pub fn mutation_kernel(
    mutation_rate: f64, rank: i32, generations: u32, fractions: &[f64],
    reference_allele: i32, observed_allele: i32, stepwise: bool
) -> f64 {
    let mutation_probability: f64 = if reference_allele >= 0 && observed_allele >= 0 {
        if stepwise {
            let lambda: f64 = mutation_rate * generations as f64;
            if lambda > 0.0 {
                let steps: u32 = observed_allele.abs_diff(reference_allele);
                lambda.powf(steps as f64) * (-lambda).exp() / factorial(steps)
            } else {
                0.0
            }
        } else {
            1.0 - (1.0 - mutation_rate).powf(generations as f64)
        }
    } else {
        0.0
    };
    breakpoint_mass(rank, generations, fractions) + mutation_probability * survival(rank, generations, fractions)
}

/// n! as a floating point product
pub fn factorial(n: u32) -> f64 {
    (2..=n).fold(1.0, |product, i| product * i as f64)
}

/// Kosambi map function, converts a genetic distance in Morgans into a recombination fraction.
/// Saturates at 0.5 once the exponential overflows.
pub fn kosambi_theta(tau: f64) -> f64 {
    let exp: f64 = (4.0 * tau).exp();
    if exp.is_infinite() {
        0.5
    } else {
        0.5 * (exp - 1.0) / (exp + 1.0)
    }
}

/// Inverse Kosambi map function, converts a recombination fraction into Morgans
pub fn kosambi_tau(theta: f64) -> f64 {
    0.25 * ((1.0 + 2.0 * theta) / (1.0 - 2.0 * theta)).ln()
}

/// Genetic distance in centiMorgans for a rate in cM/Mb over a distance in Mb
pub fn centimorgans(rate: f64, megabases: f64) -> f64 {
    rate * megabases
}
