//! Consumer-side mirrors of the cached reference collections.
//!
//! Each view keeps its own copy of the data plus loading/error flags for
//! its own calls. All views read through the same [`CacheManager`](crate::cache::CacheManager).

mod languages;
mod roles;

pub use languages::LanguagesView;
pub use roles::RolesView;

use serde::Serialize;

use crate::reference::ReferenceItem;

/// Entry of a select/dropdown list built from a reference collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
  pub label: String,
  pub value: String,
  pub code: String,
}

/// Project items into options, keeping their order.
pub fn to_options<T: ReferenceItem>(items: &[T]) -> Vec<SelectOption> {
  items
    .iter()
    .map(|item| SelectOption {
      label: item.name().to_string(),
      value: item.id().to_string(),
      code: item.code().to_string(),
    })
    .collect()
}

/// Raises a view's loading flag until dropped, also when the load is cancelled.
struct Loading<'a>(&'a mut bool);

impl<'a> Loading<'a> {
  fn start(flag: &'a mut bool) -> Self {
    *flag = true;
    Self(flag)
  }
}

impl Drop for Loading<'_> {
  fn drop(&mut self) {
    *self.0 = false;
  }
}

fn find_by_code<'a, T: ReferenceItem>(items: &'a [T], code: &str) -> Option<&'a T> {
  items.iter().find(|item| item.code() == code)
}

fn find_by_id<'a, T: ReferenceItem>(items: &'a [T], id: &str) -> Option<&'a T> {
  items.iter().find(|item| item.id() == id)
}
