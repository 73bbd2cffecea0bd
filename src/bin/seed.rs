use studioledger::{
    domain::{CreateProfessorRequest, NewEnrollment, Payment, PaymentStatus, Precedence},
    repository::{
        EnrollmentRepository, SqliteEnrollmentRepository,
        PaymentRepository, SqlitePaymentRepository,
        PlanRepository, SqlitePlanRepository,
        ProfessorRepository, SqliteProfessorRepository,
    },
};
use chrono::{Duration, Utc};
use clap::Parser;
use fake::{
    faker::{internet::en::SafeEmail, name::en::Name},
    Fake,
};
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "seed", about = "Populate a studioledger database with demo data")]
struct Args {
    /// Database URL; falls back to DATABASE_URL, then a local file.
    #[arg(long)]
    database_url: Option<String>,

    /// Professors to create, spread across the seeded plans.
    #[arg(long, default_value_t = 4)]
    professors: usize,

    /// Students enrolled per professor (capped by the plan limit).
    #[arg(long, default_value_t = 8)]
    students: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let database_url = args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://studioledger.db?mode=rwc".to_string());

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let plan_repo = SqlitePlanRepository::new(db_pool.clone());
    let professor_repo = SqliteProfessorRepository::new(db_pool.clone());
    let enrollment_repo = SqliteEnrollmentRepository::new(db_pool.clone());
    let payment_repo = SqlitePaymentRepository::new(db_pool.clone());

    let plans = plan_repo.list(false).await?;
    if plans.is_empty() {
        anyhow::bail!("no active plans found; migrations did not seed the plan registry");
    }

    println!("👩‍🏫 Creating {} professors...", args.professors);

    let mut enrollments_created = 0;
    let mut payments_created = 0;

    for i in 0..args.professors {
        let plan = &plans[i % plans.len()];
        let name: String = Name().fake();
        let email: String = SafeEmail().fake();

        let professor = professor_repo
            .create(CreateProfessorRequest {
                name,
                email,
                plan_name: plan.name.clone(),
                student_limit: plan.student_limit,
            })
            .await?;

        let students = args.students.min(plan.student_limit as usize);
        for s in 0..students {
            let student_name: String = Name().fake();
            enrollment_repo
                .create(NewEnrollment {
                    professor_id: professor.id,
                    student_name,
                    created_at: Some(Utc::now() - Duration::days(60) + Duration::minutes(s as i64)),
                })
                .await?;
            enrollments_created += 1;
        }

        // One settled lesson payment, one still open and one overdue per professor.
        let now = Utc::now();
        let seeded = [
            (PaymentStatus::Pago, now - Duration::days(20), Some(now - Duration::days(21))),
            (PaymentStatus::Pendente, now + Duration::days(10), None),
            (PaymentStatus::Pendente, now - Duration::days(5), None),
        ];

        for (status, due_date, paid_at) in seeded {
            let amount_cents: i64 = (8_000..25_000).fake();
            payment_repo
                .create(Payment {
                    id: Uuid::new_v4(),
                    professor_id: professor.id,
                    student_id: None,
                    amount_cents,
                    description: "Mensalidade de aulas".to_string(),
                    due_date,
                    paid_at,
                    status,
                    precedence: Precedence::Automatic,
                    eligible_to_schedule: status == PaymentStatus::Pago,
                    gateway_payment_id: None,
                    checkout_url: None,
                    plan_name: None,
                    manual_reason: None,
                    manual_actor: None,
                    manual_at: None,
                    created_at: now - Duration::days(30),
                    updated_at: now - Duration::days(30),
                })
                .await?;
            payments_created += 1;
        }

        println!("  ✅ {} on plan {} with {} students", professor.email, plan.name, students);
    }

    println!("  ✅ Created {} enrollments", enrollments_created);
    println!("  ✅ Created {} payment records", payments_created);

    println!("\n✨ Database seeding complete!");

    Ok(())
}
