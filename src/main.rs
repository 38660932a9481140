use anyhow::Result;
use clap::Parser;
use log::{error, info};

use payslip_finder::config::Config;
use payslip_finder::email_processor::PayslipProcessor;
use payslip_finder::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "payslip-finder")]
#[command(about = "Client mail pour archiver les fiches de paie BrightPay dans un tableur")]
#[command(version = "0.1.0")]
struct Args {
    /// Mode dry-run : traite les emails sans écrire le registre ni le tableur
    #[arg(short, long)]
    dry_run: bool,

    /// Mode daemon : lance le programme en continu, une passe par jour ouvré
    #[arg(long)]
    daemon: bool,

    /// Limite du nombre d'emails à traiter par dossier (par défaut: illimité)
    #[arg(short = 'l', long)]
    limit: Option<usize>,

    /// Vérifier la configuration sans se connecter
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger le fichier .env s'il existe
    dotenv::dotenv().ok();

    // Parser les arguments CLI
    let args = Args::parse();

    // Initialiser le logging
    env_logger::init();

    if args.dry_run {
        info!("🧪 Démarrage en mode DRY-RUN du client mail payslip-finder");
    } else {
        info!("🚀 Démarrage du client mail payslip-finder");
    }

    // Charger la configuration
    let config = Config::new()?;

    // Si demandé, vérifier seulement la configuration
    if args.check_config {
        println!("✅ Configuration valide !");
        println!("📧 Serveur IMAP: {}:{}", config.imap.server, config.imap.port);
        println!("👤 Compte: {}", config.imap.username);
        println!("📨 Expéditeur: {}", config.sender);
        println!("📁 Dossiers: {}", config.folders.join(", "));
        println!("🔑 Credentials Sheets: {}", config.sheets.credentials_path);
        println!("💾 Registre: {}", config.ledger_path);
        return Ok(());
    }

    let processor = PayslipProcessor::new(&config, args.dry_run).await;
    let scheduler = Scheduler::new(config, processor, args.limit, args.dry_run);

    // Ctrl+C lève le drapeau d'arrêt, le scheduler le remarque en moins d'une seconde
    let shutdown = scheduler.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl+C reçu, arrêt en cours");
            shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    if args.daemon {
        info!("🔄 Démarrage en mode daemon");
        scheduler.run_forever().await?;
        return Ok(());
    }

    // Mode one-shot (comportement par défaut)
    match scheduler.run_once().await {
        Ok(()) => {
            info!("✅ Traitement terminé avec succès");
        }
        Err(e) => {
            error!("❌ Erreur lors du traitement des emails: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
