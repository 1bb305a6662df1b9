use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VCard {
    pub full_name: Option<String>,
    pub nickname: Option<String>,
    /// Raw bytes of the `PHOTO/BINVAL` element.
    pub avatar: Option<Vec<u8>>,
    pub avatar_mime_type: Option<String>,
}
