//! User-configurable settings (implemented as enums) and traits to make them easier to work with in code.

mod routing_mode;
pub use routing_mode::*;

mod unrouted;
pub use unrouted::*;

use num_traits::{FromPrimitive, ToPrimitive};

/// A trait which allows infinite cycling of an enum's variants.
///
/// Useful for pushbutton user interfaces, allowing presses to advance from the current to the next variant,
/// cycling back to the beginning when all variants have been exhausted.
pub trait CycleConfig {
    /// Return the next variant, cycling back to the beginning as needed.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized,
    {
        let index = self
            .to_u8()
            .expect("enum variants should be castable to u8");
        match <Self as FromPrimitive>::from_u8(index + 1) {
            Some(new_selection) => new_selection,
            None => FromPrimitive::from_u8(0).expect("enum should not be empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_mode_cycles() {
        let mode = RoutingMode::default().cycle();
        assert_eq!(
            RoutingMode::Balance,
            mode,
            "Should advance to next variant; expected left but got right"
        );
        assert_eq!(
            RoutingMode::Table,
            mode.cycle(),
            "Should wrap around to first variant; expected left but got right"
        );
    }

    #[test]
    fn unrouted_defaults_to_drop() {
        assert_eq!(Unrouted::Drop, Unrouted::default(), "Expected left but got right");
        assert_eq!(Unrouted::Echo, Unrouted::Drop.cycle(), "Expected left but got right");
    }
}
