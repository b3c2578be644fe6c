use crate::storage::UserLink;
use migration::entities::link;

/// 空 owner 写入 NULL，永远不会被按 owner 的查询或删除命中
pub fn owner_column_value(owner_id: &str) -> Option<String> {
    if owner_id.is_empty() {
        None
    } else {
        Some(owner_id.to_string())
    }
}

/// 构造待插入的 ActiveModel，`id` 与 `added_date` 由数据库生成
pub fn new_link_model(
    short_key: &str,
    original_url: &str,
    owner_id: &str,
    correlation_id: Option<&str>,
) -> link::ActiveModel {
    use sea_orm::ActiveValue::*;

    link::ActiveModel {
        id: NotSet,
        owner_id: Set(owner_column_value(owner_id)),
        correlation_id: Set(correlation_id.map(str::to_string)),
        short_key: Set(short_key.to_string()),
        original_url: Set(original_url.to_string()),
        deleted: Set(false),
        added_date: NotSet,
    }
}

pub fn model_to_user_link(model: link::Model) -> UserLink {
    UserLink {
        short_key: model.short_key,
        original_url: model.original_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveValue;

    fn create_test_model() -> link::Model {
        link::Model {
            id: 7,
            owner_id: None,
            correlation_id: Some("c1".to_string()),
            short_key: "4b23".to_string(),
            original_url: "http://www.test.com/".to_string(),
            deleted: true,
            added_date: sea_orm::prelude::DateTime::default(),
        }
    }

    #[test]
    fn test_model_to_user_link() {
        let link = model_to_user_link(create_test_model());
        assert_eq!(link.short_key, "4b23");
        assert_eq!(link.original_url, "http://www.test.com/");
    }

    #[test]
    fn test_new_link_model_fields() {
        let model = new_link_model("61", "http://a.com/", "", Some("c1"));
        assert!(matches!(model.id, ActiveValue::NotSet));
        assert!(matches!(model.added_date, ActiveValue::NotSet));
        assert!(matches!(&model.owner_id, ActiveValue::Set(None)));
        assert!(matches!(&model.correlation_id, ActiveValue::Set(Some(c)) if c == "c1"));
        assert!(matches!(model.deleted, ActiveValue::Set(false)));
    }

    #[test]
    fn test_owner_column_value() {
        assert_eq!(owner_column_value(""), None);
        assert_eq!(owner_column_value("u1"), Some("u1".to_string()));
    }
}
