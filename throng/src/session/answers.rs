use rand::{seq::SliceRandom, Rng};

use super::model::{Answer, WorkItem};

/// An option group that offers nothing to choose from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("option group {group} of item {item} has no options")]
pub struct EmptyGroup {
    pub item: String,
    pub group: usize,
}

/// Pick one option uniformly at random from every option group of `item`.
///
/// The answer's subscript is the option's own subscript when the backend supplied
/// one, otherwise the group's position inside the item.
pub fn generate_answers<R: Rng + ?Sized>(
    item: &WorkItem,
    rng: &mut R,
) -> Result<Vec<Answer>, EmptyGroup> {
    item.groups
        .iter()
        .enumerate()
        .map(|(position, group)| {
            let option = group.options.choose(rng).ok_or_else(|| EmptyGroup {
                item: item.id.clone(),
                group: position,
            })?;
            Ok(Answer {
                content: option.content.clone(),
                scoring: option.weight.clone(),
                subscript: option
                    .subscript
                    .clone()
                    .unwrap_or_else(|| position.to_string()),
            })
        })
        .collect()
}
