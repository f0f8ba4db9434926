use crate::{
    cli::BookAction,
    commands::{connect_app, exit_with},
    config::Config,
    environment::Environment,
    library::NewBook,
};

pub async fn handle_books_command(environment: Environment, config: Config, action: BookAction) {
    let app = connect_app(environment, config).await;
    let library = &app.library;

    match action {
        BookAction::Create {
            title,
            forced_model,
            defaults,
        } => {
            let book = library
                .create_book(NewBook {
                    title,
                    forced_model,
                    model_defaults: defaults,
                })
                .await
                .unwrap_or_else(|e| exit_with(e));
            println!("📚 Created book {} \"{}\"", book.id, book.title);
        }
        BookAction::List => {
            let books = library.list_books().await.unwrap_or_else(|e| exit_with(e));
            if books.is_empty() {
                println!("No books yet");
            }
            for book in books {
                let lock = if book.is_locked { " 🔒" } else { "" };
                println!("{}  {}{lock}", book.id, book.title);
            }
        }
        BookAction::Show { book_id } => {
            let book = library
                .get_book(book_id)
                .await
                .unwrap_or_else(|e| exit_with(e));
            let chunks = library
                .list_chunks(book_id)
                .await
                .unwrap_or_else(|e| exit_with(e));

            println!("📚 {} ({})", book.title, book.id);
            if let Some(forced_model) = &book.forced_model {
                println!("  Forced model: {forced_model}");
            }
            println!("  Model defaults: {}", book.model_defaults);
            if let Some(holder) = book.locked_by_job_id {
                println!("  🔒 Locked by job {holder}");
            }
            println!();

            for chunk in chunks {
                let lock = chunk
                    .locked_by_job_id
                    .map(|holder| format!(" 🔒 {holder}"))
                    .unwrap_or_default();
                println!(
                    "  #{} {} v{} ({} words){lock}  {}",
                    chunk.position,
                    chunk.id,
                    chunk.version,
                    chunk.word_count(),
                    chunk.title.as_deref().unwrap_or("untitled"),
                );
            }
        }
        BookAction::AddChunk {
            book_id,
            content,
            title,
        } => {
            let chunk = library
                .append_chunk(book_id, title, content)
                .await
                .unwrap_or_else(|e| exit_with(e));
            println!("📄 Added chunk {} at position {}", chunk.id, chunk.position);
        }
    }
}
