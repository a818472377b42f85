use super::{
    Company, DocumentEntry, DocumentKind, LineItem, OrganizationUnit, PendingPermission,
    SubmissionRecord, SubmissionStore,
};
use crate::core::config::DatabaseConfig;
use crate::errors::{DriverError, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{info, warn};

/// MySQL-backed store. A run holds one connection for its whole duration.
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connects to the primary URL, then once to the fallback if configured.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        match Self::open(&config.url, timeout).await {
            Ok(pool) => Ok(Self { pool }),
            Err(primary) => {
                let Some(fallback) = config.fallback_url.as_deref() else {
                    return Err(primary.into());
                };
                warn!(error = %primary, "primary database unreachable, trying fallback");
                let pool = Self::open(fallback, timeout).await?;
                info!("connected to fallback database");
                Ok(Self { pool })
            }
        }
    }

    async fn open(url: &str, timeout: Duration) -> std::result::Result<MySqlPool, sqlx::Error> {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect(url)
            .await
    }
}

#[async_trait]
impl SubmissionStore for MySqlStore {
    async fn organization_unit(&self, rut: &str) -> Result<Option<OrganizationUnit>> {
        let row = sqlx::query(
            "SELECT lugar_unidad, nombre_unidad FROM pharmatender.users \
             WHERE rut = ? AND deleted_at IS NULL LIMIT 1",
        )
        .bind(rut)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<OrganizationUnit> {
            Ok(OrganizationUnit {
                position: row.try_get::<Option<String>, _>(0)?.unwrap_or_default(),
                name: row.try_get::<Option<String>, _>(1)?.unwrap_or_default(),
            })
        })
        .transpose()
    }

    async fn tender_item_count(&self, tender: &str, published: &str) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM licitaciones_diarias_total.Licitaciones_diarias \
             WHERE Licitacion = ? AND Fecha_Publicacion LIKE ?",
        )
        .bind(tender)
        .bind(format!("%{}%", published))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    async fn record_application_code(&self, tender: &str, code: &str) -> Result<()> {
        sqlx::query(
            "UPDATE licitaciones_diarias_total.Licitaciones_diarias \
             SET CodigoPostulacion = ? WHERE Licitacion = ?",
        )
        .bind(code)
        .bind(tender)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn line_items(&self, tender: &str, rut_user: &str) -> Result<Vec<LineItem>> {
        let rows = sqlx::query(
            "SELECT CAST(p.Item AS UNSIGNED) AS item, CAST(p.Precio AS CHAR) AS precio, \
                    p.Descripcion AS descripcion, \
                    (SELECT g.Glosa FROM precio_interno.item_glosa g \
                      WHERE g.Licitacion = p.Licitacion AND g.strRutUsuario = p.strRutUsuario \
                        AND g.Item = p.Item LIMIT 1) AS glosa \
             FROM precio_interno.item_producto p \
             WHERE p.Licitacion = ? AND p.strRutUsuario = ? \
             ORDER BY p.Item ASC",
        )
        .bind(tender)
        .bind(rut_user)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<LineItem> {
                Ok(LineItem {
                    correlative: row.try_get::<u64, _>("item")? as u32,
                    unit_price: row.try_get::<Option<String>, _>("precio")?.unwrap_or_default(),
                    description: row
                        .try_get::<Option<String>, _>("descripcion")?
                        .unwrap_or_default(),
                    glosa: row.try_get::<Option<String>, _>("glosa")?,
                })
            })
            .collect()
    }

    async fn company(&self, rut: &str) -> Result<Option<Company>> {
        let row = sqlx::query("SELECT id, name FROM pharmatender.company WHERE rut = ? LIMIT 1")
            .bind(rut)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Company> {
            Ok(Company {
                id: row.try_get::<i64, _>(0)?,
                name: row.try_get::<String, _>(1)?,
            })
        })
        .transpose()
    }

    async fn pending_documents(&self, company_id: i64, tender: &str) -> Result<Vec<DocumentEntry>> {
        let rows = sqlx::query(
            "SELECT nombre, tipo FROM postulaciones.carga_documentos \
             WHERE company_id = ? AND licitacion = ? AND estado = 0 \
             ORDER BY tipo DESC",
        )
        .bind(company_id)
        .bind(tender)
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let file_name: String = row.try_get(0)?;
            let raw_kind: String = row.try_get(1)?;
            match DocumentKind::parse(&raw_kind) {
                Some(kind) => documents.push(DocumentEntry { file_name, kind }),
                None => warn!(%file_name, kind = %raw_kind, "skipping document of unknown kind"),
            }
        }
        Ok(documents)
    }

    async fn record_pending_permission(&self, pending: &PendingPermission) -> Result<()> {
        sqlx::query(
            "INSERT IGNORE INTO postulaciones.licitacion_pendiente \
             (licitacion, rut_cliente, postulante) VALUES (?, ?, ?)",
        )
        .bind(&pending.tender)
        .bind(&pending.rut_user)
        .bind(&pending.rut_client)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_submission(&self, r: &SubmissionRecord) -> Result<()> {
        let created_at = r
            .created_at
            .ok_or_else(|| DriverError::InvalidArguments("submission record without timestamp".into()))?;
        let updated_at = r.updated_at.unwrap_or(created_at);

        sqlx::query(
            "INSERT INTO postulaciones.postulacion_item (nro_adquisicion, nombre, estado, moneda, \
             comprador, obs_comprador, contacto, telefono, fecha_publicacion, fecha_cierre, \
             fecha_apertura, usuario, rut_usuario, razon_social, nombre_oferta, desc_oferta, \
             fecha_ingreso, total_oferta, item, onu, esp_comprador, cantidad, cantidad_ofertada, \
             esp_proveedor, precio_unitario, total_item, link, link_postulacion, strRutCliente, \
             strRutUsuario, tipo, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
             ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&r.acquisition_number)
        .bind(&r.name)
        .bind(&r.state)
        .bind(&r.currency)
        .bind(&r.buyer)
        .bind(&r.buyer_notes)
        .bind(&r.contact)
        .bind(&r.phones)
        .bind(&r.published_at)
        .bind(&r.closes_at)
        .bind(&r.opens_at)
        .bind(&r.user_name)
        .bind(&r.user_rut)
        .bind(&r.social_reason)
        .bind(&r.offer_name)
        .bind(&r.offer_description)
        .bind(&r.offered_at)
        .bind(&r.offer_total)
        .bind(&r.item)
        .bind(&r.onu)
        .bind(&r.buyer_spec)
        .bind(&r.quantity)
        .bind(&r.offered_quantity)
        .bind(&r.supplier_spec)
        .bind(&r.unit_price)
        .bind(&r.item_total)
        .bind(&r.link)
        .bind(&r.application_link)
        .bind(&r.rut_user)
        .bind(&r.rut_client)
        .bind(&r.access)
        .bind(r.status)
        .bind(created_at)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_documents_submitted(
        &self,
        tender: &str,
        company_id: i64,
        offer_name: &str,
        at: NaiveDateTime,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE postulaciones.carga_documentos \
             SET estado = 1, nombre_postulacion = ?, fecha_postulacion = ? \
             WHERE licitacion = ? AND company_id = ? AND estado = 0",
        )
        .bind(offer_name)
        .bind(at)
        .bind(tender)
        .bind(company_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_documents_posted(
        &self,
        tender: &str,
        company_id: i64,
        offer_name: &str,
        at: NaiveDateTime,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE postulaciones.carga_documentos SET postulado = 1 \
             WHERE licitacion = ? AND company_id = ? AND nombre_postulacion = ? \
               AND fecha_postulacion = ? AND estado = 1",
        )
        .bind(tender)
        .bind(company_id)
        .bind(offer_name)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_tender_entered(&self, tender: &str, rut_client: &str) -> Result<()> {
        sqlx::query(
            "UPDATE licitaciones_diarias_intranet.Licitaciones_diarias_clientes \
             SET intEstadoInterno = 1 WHERE licitacion = ? AND strRutCliente = ?",
        )
        .bind(tender)
        .bind(rut_client)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
