// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A macro to declare flag sets used in pipeline keys.
//!
//! Generated types are plain `Copy` values with `Eq + Hash`, so they can sit
//! directly inside a [`PipelineStateDescriptor`](crate::renderer::PipelineStateDescriptor).

/// Declares a bitflag newtype with named constants and set operators.
#[macro_export]
#[doc(hidden)]
macro_rules! prism_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            /// An empty set of flags.
            pub const EMPTY: Self = Self { bits: 0 };

            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*

            /// Every named flag, in declaration order.
            pub const NAMED: &'static [(&'static str, Self)] = &[
                $((stringify!($flag_name), Self::$flag_name),)*
            ];

            /// Builds a set from raw bits, keeping only bits that belong to a named flag.
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                let mut known: $ty = 0;
                $( known |= $flag_value; )*
                Self { bits: bits & known }
            }

            /// Returns the raw bits.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Returns `true` if no flag is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Returns `true` if all flags in `other` are set in `self`.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Returns `true` if any flag in `other` is set in `self`.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Inserts the flags in `other`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Removes the flags in `other`.
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }

            /// Returns a copy with `other` inserted.
            #[must_use]
            pub const fn with(mut self, other: Self) -> Self {
                self.bits |= other.bits;
                self
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, other: Self) {
                self.bits |= other.bits;
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                if self.bits == 0 {
                    return write!(f, "{} {{ EMPTY }}", stringify!($name));
                }
                write!(f, "{} {{ ", stringify!($name))?;
                let mut remaining = self.bits;
                let mut first = true;
                $(
                    if $flag_value != 0 && (remaining & $flag_value) == $flag_value {
                        if !first {
                            write!(f, " | ")?;
                        }
                        write!(f, "{}", stringify!($flag_name))?;
                        remaining &= !$flag_value;
                        first = false;
                    }
                )*
                let _ = remaining;
                write!(f, " }}")
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::prism_bitflags;

    prism_bitflags! {
        /// Stages touched by a test pass.
        pub struct StageMask: u8 {
            const VERTEX = 1 << 0;
            const PIXEL = 1 << 1;
            const COMPUTE = 1 << 2;
            const GRAPHICS = Self::VERTEX.bits() | Self::PIXEL.bits();
        }
    }

    #[test]
    fn empty_mask_debug_and_default() {
        let mask = StageMask::default();
        assert!(mask.is_empty());
        assert_eq!(format!("{mask:?}"), "StageMask { EMPTY }");
    }

    #[test]
    fn combined_constant_contains_its_parts() {
        let mask = StageMask::GRAPHICS;
        assert!(mask.contains(StageMask::VERTEX));
        assert!(mask.contains(StageMask::PIXEL));
        assert!(!mask.intersects(StageMask::COMPUTE));
        assert_eq!(format!("{mask:?}"), "StageMask { VERTEX | PIXEL }");
    }

    #[test]
    fn from_bits_truncate_drops_unknown_bits() {
        let mask = StageMask::from_bits_truncate(0b1000_0101);
        assert_eq!(mask, StageMask::VERTEX | StageMask::COMPUTE);
    }

    #[test]
    fn insert_and_remove() {
        let mut mask = StageMask::VERTEX;
        mask |= StageMask::COMPUTE;
        mask.remove(StageMask::VERTEX);
        assert_eq!(mask, StageMask::COMPUTE);
        assert_eq!(StageMask::NAMED.len(), 4);
    }
}
