use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_template_tables::Migration),
            Box::new(m20240601_000003_create_quote_tables::Migration),
            Box::new(m20240601_000004_create_app_settings_table::Migration),
        ]
    }
}

mod m20240601_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CatalogParts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CatalogParts::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CatalogParts::BrandId).uuid().not_null())
                        .col(ColumnDef::new(CatalogParts::PartNo).string_len(64).not_null())
                        .col(ColumnDef::new(CatalogParts::Name).string().not_null())
                        .col(
                            ColumnDef::new(CatalogParts::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CatalogParts::ValidFrom).date().null())
                        .col(
                            ColumnDef::new(CatalogParts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_catalog_parts_brand_part_no")
                        .table(CatalogParts::Table)
                        .col(CatalogParts::BrandId)
                        .col(CatalogParts::PartNo)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LaborOperations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LaborOperations::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(LaborOperations::BrandId).uuid().not_null())
                        .col(
                            ColumnDef::new(LaborOperations::OperationCode)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(LaborOperations::Name).string().not_null())
                        .col(
                            ColumnDef::new(LaborOperations::DurationHours)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LaborOperations::HourlyRate)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LaborOperations::TotalPrice)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LaborOperations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_labor_operations_brand_code")
                        .table(LaborOperations::Table)
                        .col(LaborOperations::BrandId)
                        .col(LaborOperations::OperationCode)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LaborOperations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CatalogParts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CatalogParts {
        Table,
        Id,
        BrandId,
        PartNo,
        Name,
        UnitPrice,
        ValidFrom,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum LaborOperations {
        Table,
        Id,
        BrandId,
        OperationCode,
        Name,
        DurationHours,
        HourlyRate,
        TotalPrice,
        UpdatedAt,
    }
}

mod m20240601_000002_create_template_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_template_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MaintenanceTemplates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MaintenanceTemplates::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(MaintenanceTemplates::BrandId).uuid().not_null())
                        .col(ColumnDef::new(MaintenanceTemplates::ModelId).uuid().null())
                        .col(ColumnDef::new(MaintenanceTemplates::SubModelId).uuid().null())
                        .col(ColumnDef::new(MaintenanceTemplates::Name).string().not_null())
                        .col(ColumnDef::new(MaintenanceTemplates::PeriodKm).integer().null())
                        .col(
                            ColumnDef::new(MaintenanceTemplates::PeriodMonth)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MaintenanceTemplates::ServiceType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaintenanceTemplates::Approved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(MaintenanceTemplates::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaintenanceTemplates::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_maintenance_templates_brand_model")
                        .table(MaintenanceTemplates::Table)
                        .col(MaintenanceTemplates::BrandId)
                        .col(MaintenanceTemplates::ModelId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TemplateItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TemplateItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(TemplateItems::TemplateId).uuid().not_null())
                        .col(ColumnDef::new(TemplateItems::ItemType).string_len(16).not_null())
                        .col(
                            ColumnDef::new(TemplateItems::ReferenceCode)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TemplateItems::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TemplateItems::DurationOverride)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TemplateItems::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_template_items_template_id")
                                .from(TemplateItems::Table, TemplateItems::TemplateId)
                                .to(MaintenanceTemplates::Table, MaintenanceTemplates::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_template_items_template_id")
                        .table(TemplateItems::Table)
                        .col(TemplateItems::TemplateId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TemplateItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MaintenanceTemplates::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MaintenanceTemplates {
        Table,
        Id,
        BrandId,
        ModelId,
        SubModelId,
        Name,
        PeriodKm,
        PeriodMonth,
        ServiceType,
        Approved,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TemplateItems {
        Table,
        Id,
        TemplateId,
        ItemType,
        ReferenceCode,
        Quantity,
        DurationOverride,
        SortOrder,
    }
}

mod m20240601_000003_create_quote_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_quote_tables"
        }
    }

    fn money(col: Quotes) -> ColumnDef {
        ColumnDef::new(col)
            .decimal()
            .not_null()
            .default(0)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Quotes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Quotes::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Quotes::QuoteNo)
                                .string_len(40)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Quotes::BrandId).uuid().not_null())
                        .col(ColumnDef::new(Quotes::TemplateId).uuid().null())
                        .col(ColumnDef::new(Quotes::BrandName).string().not_null())
                        .col(ColumnDef::new(Quotes::ModelName).string().null())
                        .col(ColumnDef::new(Quotes::SubModelName).string().null())
                        .col(ColumnDef::new(Quotes::CustomerName).string().null())
                        .col(ColumnDef::new(Quotes::Status).string_len(20).not_null())
                        .col(money(Quotes::PartsSubtotal))
                        .col(money(Quotes::LaborSubtotal))
                        .col(money(Quotes::Subtotal))
                        .col(ColumnDef::new(Quotes::DiscountType).string_len(20).not_null())
                        .col(money(Quotes::DiscountValue))
                        .col(money(Quotes::DiscountAmount))
                        .col(money(Quotes::TaxRate))
                        .col(money(Quotes::TaxAmount))
                        .col(money(Quotes::GrandTotal))
                        .col(ColumnDef::new(Quotes::AppliedPreset).string_len(32).null())
                        .col(
                            ColumnDef::new(Quotes::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Quotes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::FinalizedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_quotes_status")
                        .table(Quotes::Table)
                        .col(Quotes::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(QuoteItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(QuoteItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(QuoteItems::QuoteId).uuid().not_null())
                        .col(ColumnDef::new(QuoteItems::ItemType).string_len(16).not_null())
                        .col(
                            ColumnDef::new(QuoteItems::ReferenceCode)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(QuoteItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(QuoteItems::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::DiscountPct)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::TotalPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::DurationHours)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::HourlyRate)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::DiscountSource)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::DiscountPreset)
                                .string_len(32)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QuoteItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_quote_items_quote_id")
                                .from(QuoteItems::Table, QuoteItems::QuoteId)
                                .to(Quotes::Table, Quotes::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_quote_items_quote_id")
                        .table(QuoteItems::Table)
                        .col(QuoteItems::QuoteId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(QuoteItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Quotes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum Quotes {
        Table,
        Id,
        QuoteNo,
        BrandId,
        TemplateId,
        BrandName,
        ModelName,
        SubModelName,
        CustomerName,
        Status,
        PartsSubtotal,
        LaborSubtotal,
        Subtotal,
        DiscountType,
        DiscountValue,
        DiscountAmount,
        TaxRate,
        TaxAmount,
        GrandTotal,
        AppliedPreset,
        Version,
        CreatedAt,
        UpdatedAt,
        FinalizedAt,
        CancelledAt,
    }

    #[derive(DeriveIden)]
    enum QuoteItems {
        Table,
        Id,
        QuoteId,
        ItemType,
        ReferenceCode,
        Name,
        Quantity,
        UnitPrice,
        DiscountPct,
        DiscountAmount,
        TotalPrice,
        DurationHours,
        HourlyRate,
        SortOrder,
        DiscountSource,
        DiscountPreset,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000004_create_app_settings_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_app_settings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AppSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AppSettings::Key)
                                .string_len(128)
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(AppSettings::Value).text().not_null())
                        .col(
                            ColumnDef::new(AppSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AppSettings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AppSettings {
        Table,
        Key,
        Value,
        UpdatedAt,
    }
}
