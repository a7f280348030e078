#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = comic_pager::run(args).await {
        eprintln!("comic-pager: {e}");
        std::process::exit(1);
    }
}
