use crate::db::{self, NewUser};
use crate::domain::models::Role;
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use rand_core::OsRng;
use sqlx::PgPool;

struct SeedProvince<'a> {
    name: &'a str,
    region: &'a str,
}

const PROVINCES: &[SeedProvince<'static>] = &[
    SeedProvince { name: "Hà Nội", region: "Đồng bằng sông Hồng" },
    SeedProvince { name: "Hải Phòng", region: "Đồng bằng sông Hồng" },
    SeedProvince { name: "Quảng Ninh", region: "Đông Bắc Bộ" },
    SeedProvince { name: "Lào Cai", region: "Tây Bắc Bộ" },
    SeedProvince { name: "Thanh Hóa", region: "Bắc Trung Bộ" },
    SeedProvince { name: "Nghệ An", region: "Bắc Trung Bộ" },
    SeedProvince { name: "Huế", region: "Bắc Trung Bộ" },
    SeedProvince { name: "Đà Nẵng", region: "Duyên hải Nam Trung Bộ" },
    SeedProvince { name: "Khánh Hòa", region: "Duyên hải Nam Trung Bộ" },
    SeedProvince { name: "Đắk Lắk", region: "Tây Nguyên" },
    SeedProvince { name: "Lâm Đồng", region: "Tây Nguyên" },
    SeedProvince { name: "Thành phố Hồ Chí Minh", region: "Đông Nam Bộ" },
    SeedProvince { name: "Đồng Nai", region: "Đông Nam Bộ" },
    SeedProvince { name: "Cần Thơ", region: "Đồng bằng sông Cửu Long" },
    SeedProvince { name: "An Giang", region: "Đồng bằng sông Cửu Long" },
];

pub async fn seed_all(pool: &PgPool, admin_password: &str) -> Result<()> {
    seed_provinces(pool).await?;
    seed_admin(pool, admin_password).await?;
    Ok(())
}

async fn seed_provinces(pool: &PgPool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM provinces")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        tracing::info!("Provinces already present ({}), skipping seed", count);
        return Ok(());
    }

    for p in PROVINCES {
        sqlx::query("INSERT INTO provinces (name, region) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
            .bind(p.name)
            .bind(p.region)
            .execute(pool)
            .await?;
    }
    tracing::info!("Seeded {} provinces", PROVINCES.len());
    Ok(())
}

async fn seed_admin(pool: &PgPool, password: &str) -> Result<()> {
    if db::find_user_by_username(pool, "admin").await?.is_some() {
        return Ok(());
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?
        .to_string();

    db::insert_user(
        pool,
        &NewUser {
            username: "admin".to_string(),
            hash,
            name: "Quản trị viên".to_string(),
            role: Role::Admin,
            user_type: None,
            member: None,
            province_id: None,
            ward_id: None,
        },
    )
    .await?;
    tracing::info!("Seeded admin account");
    Ok(())
}
