use crate::domain::model::{ColumnMapping, ResolvedColumns};
use crate::utils::error::{EtlError, Result};

pub const FIRST_NAME_PATTERNS: &[&str] = &["prenom", "prénom", "firstname", "first_name", "first name"];
pub const LAST_NAME_PATTERNS: &[&str] = &["nom", "name", "lastname", "last_name", "last name", "surname"];

fn matches_any(field: &str, patterns: &[&str]) -> bool {
    let lowered = field.to_lowercase();
    patterns.iter().any(|pattern| lowered.contains(pattern))
}

/// 從欄位名稱 (原始順序) 推斷名字與姓氏欄位
///
/// 名字的模式優先判斷：符合名字模式的欄位不會再被當作姓氏候選，
/// 例如 `Prénom` 含有 `nom`、`first_name` 含有 `name`。
pub fn detect<'a, I>(field_names: I) -> ColumnMapping
where
    I: IntoIterator<Item = &'a str>,
{
    let fields: Vec<&str> = field_names.into_iter().collect();

    let first_name_field = fields
        .iter()
        .find(|field| matches_any(field, FIRST_NAME_PATTERNS))
        .map(|field| field.to_string());

    let last_name_field = fields
        .iter()
        .filter(|field| !matches_any(field, FIRST_NAME_PATTERNS))
        .find(|field| matches_any(field, LAST_NAME_PATTERNS))
        .map(|field| field.to_string());

    ColumnMapping {
        first_name_field,
        last_name_field,
    }
}

impl ColumnMapping {
    pub fn is_complete(&self) -> bool {
        self.first_name_field.is_some() && self.last_name_field.is_some()
    }

    /// 兩個角色都必須存在，否則整批視為設定錯誤
    pub fn require<'a, I>(self, found: I) -> Result<ResolvedColumns>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match (self.first_name_field, self.last_name_field) {
            (Some(first_name_field), Some(last_name_field)) => Ok(ResolvedColumns {
                first_name_field,
                last_name_field,
            }),
            _ => Err(EtlError::ColumnDetectionError {
                found: found.into_iter().map(str::to_string).collect(),
            }),
        }
    }
}
