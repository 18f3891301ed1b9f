use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::Config;
use crate::routes::{configure, json_error_handler};
use crate::service::JudgeService;

pub fn build_server(config: Config) -> std::io::Result<Server> {
    let service = web::Data::new(JudgeService::new(&config));
    let (bind_address, bind_port) = config.server.address();

    log::info!(
        "Languages: {}; workspaces under {}",
        config.languages.names().join(", "),
        config.judge.workspace_root().display()
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind((bind_address.as_str(), bind_port))?
    .run();

    log::info!("Compiler service listening on {bind_address}:{bind_port}");

    Ok(server)
}
