/// Caller-supplied context for box operations: which box is open and who is
/// looking at it. Passed explicitly to every call instead of being read from
/// process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxContext {
    pub box_id: String,
    pub uid: String,
}

impl BoxContext {
    pub fn new(box_id: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            box_id: box_id.into(),
            uid: uid.into(),
        }
    }

    /// A user that has not joined any box yet has an empty box id.
    pub fn has_box(&self) -> bool {
        !self.box_id.trim().is_empty()
    }
}
