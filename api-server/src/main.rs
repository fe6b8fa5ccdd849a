#[rocket::launch]
fn launch() -> _ {
    lapor_api::rocket()
}
