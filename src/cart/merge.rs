//! Cart Line Merger
//!
//! Decides whether a prospective cart line describes the same purchasable configuration as a
//! line already in the cart. Only top-level lines are merge targets; bundle components follow
//! their master.

use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::cart::{
    Cart, CartKey, LineItem, LineKey,
    identity::{LineFingerprint, component_signature},
};

/// Result of adding a line through the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The candidate was folded into an existing line.
    Merged(LineKey),

    /// The candidate was inserted as a new line.
    Inserted(LineKey),
}

impl MergeOutcome {
    /// Key of the line now holding the candidate's units.
    pub fn key(self) -> LineKey {
        match self {
            Self::Merged(key) | Self::Inserted(key) => key,
        }
    }
}

/// Merges identical cart lines by comparing their fingerprints.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartLineMerger;

impl CartLineMerger {
    /// Create a merger.
    pub fn new() -> Self {
        Self
    }

    /// Find the existing top-level line that `candidate` should be merged into.
    ///
    /// The candidate's bundle composition is built from the component lines already in the cart
    /// under its own cart key. A candidate that is itself a bundle component never matches, and
    /// a candidate that cannot be fingerprinted never matches either.
    pub fn find_matching_line(&self, cart: &Cart, candidate: &LineItem) -> Option<LineKey> {
        if candidate.is_bundle_component() {
            return None;
        }

        let fingerprint = match LineFingerprint::in_cart(cart, candidate) {
            Ok(fingerprint) => fingerprint,
            Err(error) => {
                warn!(
                    product = %candidate.product_id(),
                    %error,
                    "candidate line cannot be fingerprinted; not merging"
                );

                return None;
            }
        };

        cart.top_level_lines().find_map(|(key, existing)| {
            if candidate
                .cart_key()
                .is_some_and(|own| existing.cart_key() == Some(own))
            {
                return None;
            }

            match LineFingerprint::in_cart(cart, existing) {
                Ok(existing_fingerprint) if existing_fingerprint == fingerprint => {
                    trace!(?key, %fingerprint, "found matching cart line");

                    Some(key)
                }
                Ok(_) => None,
                Err(error) => {
                    trace!(?key, %error, "skipping cart line that cannot be fingerprinted");

                    None
                }
            }
        })
    }

    /// Add `candidate` to the cart, merging it into an identical line when one exists.
    ///
    /// On a merge the matched line's quantity grows by the candidate's quantity and the
    /// candidate's pending components are folded into the matched line's components.
    pub fn add(&self, cart: &mut Cart, candidate: LineItem) -> MergeOutcome {
        let Some(target) = self.find_matching_line(cart, &candidate) else {
            let key = cart.insert(candidate);

            trace!(?key, "inserted new cart line");

            return MergeOutcome::Inserted(key);
        };

        if let Some(line) = cart.get_mut(target) {
            line.add_quantity(candidate.quantity());
        }

        let target_key = cart.get(target).and_then(LineItem::cart_key).cloned();

        if let (Some(pending_key), Some(target_key)) = (candidate.cart_key(), target_key) {
            fold_components(cart, pending_key, &target_key);
        }

        trace!(key = ?target, "merged candidate into existing cart line");

        MergeOutcome::Merged(target)
    }
}

/// Move the components waiting under `pending` onto the master keyed `target`, adding units to
/// an equivalent component where one exists.
fn fold_components(cart: &mut Cart, pending: &CartKey, target: &CartKey) {
    let pending_components: SmallVec<[(LineKey, Option<String>, u32); 4]> = cart
        .components_of(pending)
        .map(|(key, line)| (key, component_signature(line).ok(), line.quantity()))
        .collect();

    let target_components: SmallVec<[(LineKey, Option<String>); 4]> = cart
        .components_of(target)
        .map(|(key, line)| (key, component_signature(line).ok()))
        .collect();

    for (pending_key, signature, quantity) in pending_components {
        let counterpart = signature.as_ref().and_then(|signature| {
            target_components
                .iter()
                .find(|(_, existing)| existing.as_ref() == Some(signature))
                .map(|(key, _)| *key)
        });

        match counterpart.and_then(|key| cart.get_mut(key)) {
            Some(existing) => {
                existing.add_quantity(quantity);
                cart.remove(pending_key);
            }
            None => {
                if let Some(line) = cart.get_mut(pending_key) {
                    line.relink(target.clone());
                }
            }
        }
    }
}
