/// A single field of a partial update.
///
/// Plain `Option<T>` can't distinguish "leave this column alone" from "set it
/// to NULL" — `update_processing` needs both, since `failure_stage` and
/// `failed_reason` are cleared on a successful transition but left untouched
/// on others. `Unset` means don't touch the column; `Set(None)` means write
/// NULL; `Set(Some(v))` means write `v`.
#[derive(Debug, Clone, Default)]
pub enum Patch<T> {
    #[default]
    Unset,
    Set(Option<T>),
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }

    pub fn into_option(self) -> Option<Option<T>> {
        match self {
            Patch::Unset => None,
            Patch::Set(v) => Some(v),
        }
    }
}

impl<T> From<T> for Patch<T> {
    fn from(value: T) -> Self {
        Patch::Set(Some(value))
    }
}
