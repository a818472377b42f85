use crate::errors::Result;
use crate::workflow::{parse_flag, JobParams, LoginParams, RutKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tender-pilot", version, about = "Logs into Mercado Público and submits tender offers")]
pub struct Cli {
    /// TOML configuration file; defaults apply when absent.
    #[arg(long, env = "TENDER_PILOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Checks the credentials and the user's organization unit.
    Login(LoginArgs),
    /// Runs a full offer submission for one tender.
    Submit(SubmitArgs),
}

#[derive(Debug, clap::Args)]
pub struct LoginArgs {
    pub user: String,
    pub password: String,
    pub access: String,
    pub company_id: i64,
    pub user_id: i64,
}

#[derive(Debug, clap::Args)]
pub struct SubmitArgs {
    pub rut_user: String,
    pub rut_client: String,
    pub tender: String,
    pub pub_date: String,
    pub mp_user: String,
    pub mp_password: String,
    /// Underscores stand for spaces.
    pub offer_name: String,
    /// Underscores stand for spaces.
    pub offer_description: String,
    pub access: String,
    /// `si` or `no`
    pub joint_offer: String,
    pub representative_rut: String,
    pub idp_user: String,
    pub idp_password: String,
    /// `si` to sign through the identity provider
    pub signature: String,
    /// `representante` or `otro`
    pub rut_kind: String,
    /// `1` when the client has not yet granted the signing permission
    pub pending_permission: String,
}

impl LoginArgs {
    pub fn into_params(self) -> LoginParams {
        LoginParams {
            user: self.user,
            password: self.password,
            access: self.access,
            company_id: self.company_id,
            user_id: self.user_id,
        }
    }
}

fn spaced(raw: &str) -> String {
    raw.replace('_', " ")
}

impl SubmitArgs {
    pub fn into_job(self) -> Result<JobParams> {
        Ok(JobParams {
            joint_offer: parse_flag(&self.joint_offer)?,
            sign_with_idp: parse_flag(&self.signature)?,
            rut_kind: RutKind::parse(&self.rut_kind)?,
            pending_permission: parse_flag(&self.pending_permission)?,
            offer_name: spaced(&self.offer_name),
            offer_description: spaced(&self.offer_description),
            rut_user: self.rut_user,
            rut_client: self.rut_client,
            tender: self.tender,
            published: self.pub_date,
            mp_user: self.mp_user,
            mp_password: self.mp_password,
            access: self.access,
            representative_rut: self.representative_rut,
            idp_user: self.idp_user,
            idp_password: self.idp_password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DriverError;

    fn submit(extra: &[&str]) -> Vec<String> {
        let mut args = vec![
            "tender-pilot",
            "submit",
            "76111111-1",
            "76222222-2",
            "1057-22-LE24",
            "2024-05-02",
            "12345678-9",
            "secreto",
            "Oferta_Acme_2024",
            "Insumos_medicos",
            "1",
            "si",
            "11111111-1",
            "11111111-1",
            "clave",
            "no",
            "otro",
        ];
        args.extend_from_slice(extra);
        args.into_iter().map(String::from).collect()
    }

    #[test]
    fn test_submit_arguments_become_job() {
        let cli = Cli::try_parse_from(submit(&["0"])).unwrap();
        let Command::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        let job = args.into_job().unwrap();

        assert_eq!(job.offer_name, "Oferta Acme 2024");
        assert_eq!(job.offer_description, "Insumos medicos");
        assert!(job.joint_offer);
        assert!(!job.sign_with_idp);
        assert_eq!(job.rut_kind, RutKind::Other);
        assert!(!job.pending_permission);
        assert_eq!(job.published, "2024-05-02");
    }

    #[test]
    fn test_missing_argument_is_rejected() {
        assert!(Cli::try_parse_from(submit(&[])).is_err());
        assert!(Cli::try_parse_from(["tender-pilot", "login", "u", "p", "1", "2"]).is_err());
    }

    #[test]
    fn test_bad_flag_is_invalid_arguments() {
        let cli = Cli::try_parse_from(submit(&["quizas"])).unwrap();
        let Command::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert!(matches!(args.into_job(), Err(DriverError::InvalidArguments(_))));
    }

    #[test]
    fn test_login_arguments() {
        let cli = Cli::try_parse_from([
            "tender-pilot",
            "--config",
            "pilot.toml",
            "login",
            "12345678-9",
            "secreto",
            "1",
            "17",
            "204",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("pilot.toml")));
        let Command::Login(args) = cli.command else {
            panic!("expected login");
        };
        let params = args.into_params();
        assert_eq!(params.company_id, 17);
        assert_eq!(params.user_id, 204);
    }
}
