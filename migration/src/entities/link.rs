use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "links")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_id: Option<String>,
    pub correlation_id: Option<String>,
    #[sea_orm(unique)]
    pub short_key: String,
    #[sea_orm(unique)]
    pub original_url: String,
    pub deleted: bool,
    pub added_date: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
