use sea_orm::entity::prelude::*;

/// One counter report for a link. Rows are only ever inserted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bandwidth")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub link: i64,
    /// Sender-side timestamp; untrusted, never used for ordering
    pub time: f64,
    pub rx: i64,
    pub tx: i64,
    pub update_date: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
