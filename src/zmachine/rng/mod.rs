//! [Random number generator](https://inform-fiction.org/zmachine/standards/z1point1/sect02.html#four)
use core::fmt;

pub mod chacha_rng;

/// Generator mode
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Entropy- or explicitly-seeded random numbers
    Random,
    /// A repeating 1..=n sequence
    Predictable,
}

pub trait ZRng: Send {
    fn type_name(&self) -> &str;

    /// Seed the generator and switch to [Mode::Random]. A seed of 0
    /// reseeds from entropy.
    fn seed(&mut self, seed: u16);

    /// Switch to [Mode::Predictable], cycling from 1 to `seed`.
    fn predictable(&mut self, seed: u16);

    /// The next value in 1..=`range`.
    fn random(&mut self, range: u16) -> u16;
}

impl fmt::Debug for dyn ZRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
