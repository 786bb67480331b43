use clap::{Parser, Subcommand};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;

const SESSION_FILE: &str = ".portal_session";

#[derive(Parser)]
#[command(name = "portal-cli")]
#[command(about = "Admin CLI for the timetable portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in as an admin; the session cookie is kept in .portal_session
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    AddRoom {
        #[arg(short, long)]
        name: String,
        /// Classroom, Lab or Tutorial
        #[arg(short = 't', long = "type")]
        kind: String,
        #[arg(short, long)]
        capacity: u32,
        #[arg(short, long)]
        department: Option<String>,
    },
    ListRooms {
        #[arg(short, long)]
        department: Option<String>,
    },
    DeleteRoom {
        #[arg(short, long)]
        id: String,
    },
    AddSubject {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        code: String,
        #[arg(short, long)]
        year: String,
        /// Theory, Lab or Tutorial
        #[arg(short = 't', long = "type")]
        kind: String,
        #[arg(short = 'H', long)]
        hours_per_week: u32,
        #[arg(short, long)]
        department: Option<String>,
    },
    ListSubjects,
    AddTeacher {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        department: String,
        #[arg(short, long)]
        password: String,
    },
    ListTeachers,
    DeleteTeacher {
        #[arg(short, long)]
        id: String,
    },
    ListStudents {
        #[arg(short, long)]
        year: Option<String>,
        #[arg(short, long)]
        division: Option<String>,
    },
    ListTimetables,
    /// Send a constraints JSON file to the scheduler and store the result
    Generate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Download a class timetable, or with --teacher a teacher's, as CSV
    ExportCsv {
        #[arg(short, long, conflicts_with = "teacher")]
        id: Option<String>,
        #[arg(short, long)]
        teacher: Option<String>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn with_session(req: RequestBuilder) -> RequestBuilder {
    match fs::read_to_string(SESSION_FILE) {
        Ok(cookie) => req.header(COOKIE, cookie.trim()),
        Err(_) => req,
    }
}

async fn print_response(res: Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(text);
    println!("{status}\n{pretty}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api", cli.url.trim_end_matches('/'));

    match cli.command {
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{api}/admin/login"))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            let session = res
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .filter_map(|v| v.split(';').next())
                .find(|pair| pair.starts_with("sid="))
                .map(str::to_string);
            match session {
                Some(cookie) if res.status().is_success() => {
                    fs::write(SESSION_FILE, cookie)?;
                    println!("Logged in. Session saved to {SESSION_FILE}");
                }
                _ => println!("Login failed: {}", res.text().await?),
            }
        }
        Commands::Logout => {
            let res = with_session(client.post(format!("{api}/admin/logout"))).send().await;
            let _ = fs::remove_file(SESSION_FILE);
            if let Err(e) = res {
                println!("Server logout failed ({e}); local session removed anyway.");
            } else {
                println!("Logged out (session removed).");
            }
        }
        Commands::AddRoom { name, kind, capacity, department } => {
            let res = with_session(client.post(format!("{api}/rooms/add")))
                .json(&json!({ "name": name, "type": kind, "capacity": capacity, "department": department }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ListRooms { department } => {
            let mut req = with_session(client.get(format!("{api}/rooms/all")));
            if let Some(department) = department {
                req = req.query(&[("department", department)]);
            }
            print_response(req.send().await?).await?;
        }
        Commands::DeleteRoom { id } => {
            let res = with_session(client.delete(format!("{api}/rooms/delete/{id}"))).send().await?;
            print_response(res).await?;
        }
        Commands::AddSubject { name, code, year, kind, hours_per_week, department } => {
            let res = with_session(client.post(format!("{api}/subjects/add")))
                .json(&json!({
                    "name": name,
                    "code": code,
                    "year": year,
                    "type": kind,
                    "hoursPerWeek": hours_per_week,
                    "department": department
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ListSubjects => {
            let res = with_session(client.get(format!("{api}/subjects/all"))).send().await?;
            print_response(res).await?;
        }
        Commands::AddTeacher { name, email, department, password } => {
            let res = with_session(client.post(format!("{api}/admin/add-teacher")))
                .json(&json!({ "name": name, "email": email, "department": department, "password": password }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ListTeachers => {
            let res = with_session(client.get(format!("{api}/teacher"))).send().await?;
            print_response(res).await?;
        }
        Commands::DeleteTeacher { id } => {
            let res = with_session(client.delete(format!("{api}/admin/delete-teacher/{id}")))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ListStudents { year, division } => {
            let mut query = Vec::new();
            if let Some(year) = year {
                query.push(("year", year));
            }
            if let Some(division) = division {
                query.push(("division", division));
            }
            let res = with_session(client.get(format!("{api}/admin/students")))
                .query(&query)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ListTimetables => {
            let res = with_session(client.get(format!("{api}/timetable/all"))).send().await?;
            print_response(res).await?;
        }
        Commands::Generate { file } => {
            let payload: Value = serde_json::from_str(&fs::read_to_string(&file)?)?;
            let res = with_session(client.post(format!("{api}/scheduler/generate")))
                .json(&payload)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ExportCsv { id, teacher, out } => {
            let url = match (id, teacher) {
                (Some(id), _) => format!("{api}/timetable/{id}/csv"),
                (None, Some(teacher)) => format!("{api}/timetable/teacher/{teacher}/csv"),
                (None, None) => return Err("pass --id or --teacher".into()),
            };
            let res = with_session(client.get(url)).send().await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }
            let csv = res.text().await?;
            match out {
                Some(path) => {
                    fs::write(&path, csv)?;
                    println!("Saved {}", path.display());
                }
                None => print!("{csv}"),
            }
        }
    }

    Ok(())
}
