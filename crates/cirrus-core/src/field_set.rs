// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed field sets for partial commits.
//!
//! Every entity declares its persisted attributes as a field enum generated by
//! [`entity_fields!`]. A [`FieldSet`] collects the attributes a mutation is
//! allowed to write; the persistence layer turns it into an `UPDATE` that
//! touches exactly those columns and nothing else.

use std::fmt;
use std::marker::PhantomData;

/// A persisted attribute of an entity.
pub trait Field: Copy + Eq + fmt::Debug + 'static {
    /// Every field of the entity, in declaration order.
    const ALL: &'static [Self];

    /// Bit position of this field in a [`FieldSet`].
    fn index(self) -> u32;

    /// Column name in the backing store.
    fn column(self) -> &'static str;
}

/// Generates a field enum and its [`Field`] implementation.
///
/// ```ignore
/// entity_fields! {
///     /// Persisted disk attributes.
///     pub enum DiskField {
///         /// Display name.
///         Name => "name",
///     }
/// }
/// ```
macro_rules! entity_fields {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $column:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $crate::field_set::Field for $name {
            const ALL: &'static [Self] = &[$(Self::$variant,)+];

            fn index(self) -> u32 {
                self as u32
            }

            fn column(self) -> &'static str {
                match self {
                    $(Self::$variant => $column,)+
                }
            }
        }

        const _: () = assert!(
            <$name as $crate::field_set::Field>::ALL.len() <= 64,
            "field sets hold at most 64 fields"
        );
    };
}

pub(crate) use entity_fields;

/// Set of fields a mutation may persist, backed by a 64-bit mask.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FieldSet<F: Field> {
    bits: u64,
    _field: PhantomData<F>,
}

impl<F: Field> FieldSet<F> {
    /// An empty set.
    pub const fn new() -> Self {
        Self {
            bits: 0,
            _field: PhantomData,
        }
    }

    /// A set containing the given fields.
    pub fn of(fields: &[F]) -> Self {
        let mut set = Self::new();
        for field in fields {
            set.insert(*field);
        }
        set
    }

    /// A set containing every field of the entity.
    pub fn all() -> Self {
        Self::of(F::ALL)
    }

    /// Add a field. Returns `true` if it was not already present.
    pub fn insert(&mut self, field: F) -> bool {
        let mask = 1u64 << field.index();
        let added = self.bits & mask == 0;
        self.bits |= mask;
        added
    }

    /// Remove a field. Returns `true` if it was present.
    pub fn remove(&mut self, field: F) -> bool {
        let mask = 1u64 << field.index();
        let present = self.bits & mask != 0;
        self.bits &= !mask;
        present
    }

    /// Whether the set contains a field.
    pub fn contains(&self, field: F) -> bool {
        self.bits & (1u64 << field.index()) != 0
    }

    /// Number of fields in the set.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        F::ALL.iter().copied().filter(|field| self.contains(*field))
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> Vec<&'static str> {
        self.iter().map(Field::column).collect()
    }
}

impl<F: Field> Default for FieldSet<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Field> fmt::Debug for FieldSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<F: Field> Extend<F> for FieldSet<F> {
    fn extend<I: IntoIterator<Item = F>>(&mut self, iter: I) {
        for field in iter {
            self.insert(field);
        }
    }
}

impl<F: Field> FromIterator<F> for FieldSet<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
