use rand::distr::Alphanumeric;
use rand::{Rng, rng};

pub fn random_string(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
}
